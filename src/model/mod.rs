pub mod revision;
pub mod tag;

pub use revision::Revision;
pub use tag::TagTable;
