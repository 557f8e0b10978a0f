pub mod instances;
pub mod proxy;
