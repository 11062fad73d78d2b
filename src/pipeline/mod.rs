pub mod builder;
pub mod router;
pub mod stdin;
