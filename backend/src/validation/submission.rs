//! Submission-level validators, run before any sheet content is read.

use crate::models::SubmissionMessageType;
use crate::parser::WorksheetSet;
use crate::schema::{MimetypeConfig, RequiredFilesConfig, ValidationSchemaParser};

use super::state::MediaState;

/// Each required file must be present as a worksheet (case-insensitive).
pub fn required_files(set: &WorksheetSet, config: &RequiredFilesConfig, state: &mut MediaState) {
    for name in &config.required_files {
        if set.worksheet(name).is_none() {
            state.add_error(
                SubmissionMessageType::MissingRequiredFile,
                format!("Missing required file: {}", name.trim()),
            );
        }
    }
}

/// Every file in the submission must match one of the allowed mimetypes.
/// An empty pattern list allows anything.
pub fn mimetype(
    set: &WorksheetSet,
    config: &MimetypeConfig,
    parser: &ValidationSchemaParser,
    state: &mut MediaState,
) {
    if config.reg_exps.is_empty() {
        return;
    }

    for entry in &set.media {
        let allowed = config
            .reg_exps
            .iter()
            .filter_map(|pattern| parser.regex(pattern, None))
            .any(|re| re.is_match(&entry.mimetype));

        if !allowed {
            state.add_error(
                SubmissionMessageType::InvalidMimetype,
                format!(
                    "File {} has mimetype {}, which is not accepted",
                    entry.file_name, entry.mimetype
                ),
            );
        }
    }
}
