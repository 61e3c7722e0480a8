pub mod migration_config;
pub mod sync_config;
pub mod inline_expression;
pub mod translator;
