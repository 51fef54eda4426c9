pub(crate) mod analyze;
pub(crate) mod cache;
pub(crate) mod limits;
pub(crate) mod search;

mod shared;
