// Kept in sync by hand with the CREATE TABLE statements in
// repository/diesel_store.rs.

diesel::table! {
    extraction_jobs (id) {
        id -> Text,
        request -> Text,
        status -> Text,
        progress -> Integer,
        status_message -> Text,
        raw_ocr_text -> Nullable<Text>,
        parsed_rows -> Text,
        row_count -> Integer,
        avg_confidence -> Double,
        debug_log -> Text,
        created_at -> Text,
        updated_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    entities (id) {
        id -> Text,
        full_name -> Text,
        person_type -> Text,
        source_url -> Text,
        extraction_method -> Text,
        context_text -> Text,
        confidence -> Double,
        gender -> Nullable<Text>,
        age -> Nullable<Text>,
        locations -> Text,
        relationships -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    row_log (fingerprint) {
        fingerprint -> Text,
        source_url -> Text,
        volume_id -> Text,
        page_number -> Integer,
        row_index -> Integer,
        entity_id -> Nullable<Text>,
        extraction_type -> Text,
        raw_text -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    coverage (volume_id, page_number) {
        volume_id -> Text,
        page_number -> Integer,
        source_url -> Text,
        ocr_service -> Text,
        ocr_confidence -> Double,
        ocr_text_length -> Integer,
        detected_rows -> Integer,
        emitted_persons -> Integer,
        named_persons -> Integer,
        placeholder_persons -> Integer,
        owner_candidates -> Text,
        owner_assigned -> Nullable<Text>,
        owner_warning -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    relationships (id) {
        id -> Integer,
        source_url -> Text,
        kind -> Text,
        subject -> Text,
        object -> Text,
        confidence -> Double,
        evidence -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    documents (source_url) {
        source_url -> Text,
        final_url -> Text,
        mime_type -> Text,
        fetch_method -> Text,
        content_hash -> Text,
        size_bytes -> BigInt,
        page_count -> Integer,
        fetched_at -> Text,
    }
}
