//! Diesel ORM models for the provenance tables.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::extraction_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRecord {
    pub id: String,
    pub request: String,
    pub status: String,
    pub progress: i32,
    pub status_message: String,
    pub raw_ocr_text: Option<String>,
    pub parsed_rows: String,
    pub row_count: i32,
    pub avg_confidence: f64,
    pub debug_log: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::extraction_jobs)]
pub struct NewJob<'a> {
    pub id: &'a str,
    pub request: &'a str,
    pub status: &'a str,
    pub progress: i32,
    pub status_message: &'a str,
    pub raw_ocr_text: Option<&'a str>,
    pub parsed_rows: &'a str,
    pub row_count: i32,
    pub avg_confidence: f64,
    pub debug_log: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
    pub completed_at: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::entities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntityRow {
    pub id: String,
    pub full_name: String,
    pub person_type: String,
    pub source_url: String,
    pub extraction_method: String,
    pub context_text: String,
    pub confidence: f64,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub locations: String,
    pub relationships: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::entities)]
pub struct NewEntity<'a> {
    pub id: &'a str,
    pub full_name: &'a str,
    pub person_type: &'a str,
    pub source_url: &'a str,
    pub extraction_method: &'a str,
    pub context_text: &'a str,
    pub confidence: f64,
    pub gender: Option<&'a str>,
    pub age: Option<&'a str>,
    pub locations: &'a str,
    pub relationships: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::row_log)]
pub struct NewRowLog<'a> {
    pub fingerprint: &'a str,
    pub source_url: &'a str,
    pub volume_id: &'a str,
    pub page_number: i32,
    pub row_index: i32,
    pub entity_id: Option<&'a str>,
    pub extraction_type: &'a str,
    pub raw_text: &'a str,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::coverage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CoverageRow {
    pub volume_id: String,
    pub page_number: i32,
    pub source_url: String,
    pub ocr_service: String,
    pub ocr_confidence: f64,
    pub ocr_text_length: i32,
    pub detected_rows: i32,
    pub emitted_persons: i32,
    pub named_persons: i32,
    pub placeholder_persons: i32,
    pub owner_candidates: String,
    pub owner_assigned: Option<String>,
    pub owner_warning: Option<String>,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::coverage)]
pub struct NewCoverage<'a> {
    pub volume_id: &'a str,
    pub page_number: i32,
    pub source_url: &'a str,
    pub ocr_service: &'a str,
    pub ocr_confidence: f64,
    pub ocr_text_length: i32,
    pub detected_rows: i32,
    pub emitted_persons: i32,
    pub named_persons: i32,
    pub placeholder_persons: i32,
    pub owner_candidates: &'a str,
    pub owner_assigned: Option<&'a str>,
    pub owner_warning: Option<&'a str>,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::relationships)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RelationshipRow {
    pub id: i32,
    pub source_url: String,
    pub kind: String,
    pub subject: String,
    pub object: String,
    pub confidence: f64,
    pub evidence: String,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::relationships)]
pub struct NewRelationship<'a> {
    pub source_url: &'a str,
    pub kind: &'a str,
    pub subject: &'a str,
    pub object: &'a str,
    pub confidence: f64,
    pub evidence: &'a str,
    pub created_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub source_url: &'a str,
    pub final_url: &'a str,
    pub mime_type: &'a str,
    pub fetch_method: &'a str,
    pub content_hash: &'a str,
    pub size_bytes: i64,
    pub page_count: i32,
    pub fetched_at: &'a str,
}
