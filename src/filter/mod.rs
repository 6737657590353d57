pub mod types;
pub mod descriptor;
pub mod filter_where;
pub mod filter_order;
pub mod error;

pub use types::*;
pub use descriptor::QueryDescriptor;
pub use error::FilterError;
pub use filter_order::FilterOrder;
pub use filter_where::FilterWhere;
