//! Entity, relationship and transaction extraction from prose.

mod extractor;
mod ner;
mod types;
mod validator;

pub use extractor::{aggregate_confidence, find_amounts, find_dates, NarrativeExtractor};
pub use ner::{NerBackend, NerEntity, NerEntityType, NerResult, RegexNerBackend};
pub use types::{
    Currency, DateMention, DatePrecision, MoneyAmount, NarrativePerson, NarrativeResult,
    NarrativeStatistics, TargetMention, Transaction, TransactionKind, CONTEXT_COLUMN,
    LOCATIONS_COLUMN, LOCATION_SEPARATOR, NAME_COLUMN, OWNER_COLUMN, ROLE_COLUMN,
};
pub use validator::{clean_name, is_valid_given_name, is_valid_name, is_valid_slaveholder_name};
