pub mod alert;
pub mod forecast;
pub mod table;

pub use alert::*;
pub use forecast::*;
pub use table::*;
