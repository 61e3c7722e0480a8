pub mod connection;
pub mod datasource_config;
pub mod driver;
