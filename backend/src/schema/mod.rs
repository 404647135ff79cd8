//! Validation schema: the DSL, its parser, and its meta-schema.
//!
//! - [`config`] - Serde model of the schema DSL
//! - [`parser`] - [`ValidationSchemaParser`] with per-scope accessors
//! - [`meta`] - Embedded JSON Schema for offline contract checks

pub mod config;
pub mod meta;
pub mod parser;

pub use config::{
    AllowedCode, BasicConfig, CodeConfig, CodeName, ColumnSchema, ColumnUniqueConfig, ColumnValidator, FileSchema,
    FileValidator, FormatConfig, MimetypeConfig, ParentChildKeyMatchConfig, RangeConfig, RecommendedColumnsConfig,
    RequiredColumnsConfig, RequiredFilesConfig, SubmissionValidator, ValidColumnsConfig, ValidationSchema,
    WorkbookValidator,
};
pub use meta::{check_config, validation_config_json_schema};
pub use parser::ValidationSchemaParser;
