mod mounting_type;
mod record;
mod trap_type;

pub use mounting_type::*;
pub use record::*;
pub use trap_type::*;
