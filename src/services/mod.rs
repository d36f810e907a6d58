// Service exports
pub mod table;
pub mod validator;

pub use table::{read_addresses, read_pois, write_results, TableError};
pub use validator::{run_validation, ValidationError};
