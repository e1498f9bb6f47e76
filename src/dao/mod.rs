/// Database model definitions.
pub mod models;
/// Question bank collaborator.
pub mod question_bank;
/// Room persistence backends.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
