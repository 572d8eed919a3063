mod aggregate;
mod collection;
mod command;
mod compare;
mod database;
mod error;
mod field;
mod filter;
mod index;
mod mutation;
mod options;
mod projection;
mod result;
mod snapshot;
mod sort;

pub use bson::{Bson, Document, doc};
pub use collection::Collection;
pub use database::{DEFAULT_DB_NAME, Database};
pub use error::DbError;
pub use filter::{Expression, parse_filter};
pub use index::{ID_INDEX_NAME, IndexModel, default_index_name};
pub use mutation::Update;
pub use options::{FindAndModifyOptions, FindOptions};
pub use result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
