//! Reserved table names, input keys, and exit codes.

/// Input tab used when a manual result does not name one.
pub const DEFAULT_INPUT_TAB: &str = "RBLInput";

/// Pseudo-engine name remapped to the first configured engine/tab during merge.
pub const RESULT_PROCESSING_ENGINE: &str = "_ResultProcessing";

/// Prefix given to manual engines whose name collides with a service engine.
pub const MANUAL_ENGINE_PREFIX: &str = "Manual.";

/// Suffix the service appends to engine names when running test engines.
pub const TEST_ENGINE_SUFFIX: &str = "_Test";

/// One-shot input naming the input that triggered a calculation.
pub const INPUT_TRIGGER: &str = "iInputTrigger";

/// Message pushed to the error list when any engine fails.
pub const GENERIC_CALCULATION_ERROR: &str = "An error occurred during form calculation.";

/// `@id` of the error pushed on calculation failure.
pub const SYSTEM_VALIDATION_ID: &str = "System";

/// Result table names with dedicated merge behavior.
pub mod tables {
    pub const RBL_DEFAULTS: &str = "rbl-defaults";
    pub const RBL_INPUT: &str = "rbl-input";
    pub const RBL_DISABLED: &str = "rbl-disabled";
    pub const RBL_DISPLAY: &str = "rbl-display";
    pub const RBL_SKIP: &str = "rbl-skip";
    pub const RBL_VALUE: &str = "rbl-value";
    pub const RBL_LISTCONTROL: &str = "rbl-listcontrol";
    pub const ERRORS: &str = "errors";
    pub const WARNINGS: &str = "warnings";
    pub const TABLE_OUTPUT_CONTROL: &str = "table-output-control";
    pub const JWT_DATA: &str = "jwt-data";
    pub const API_ACTIONS: &str = "api-actions";

    /// Tables upserted by `@id` instead of replaced.
    pub const MERGEABLE: [&str; 6] = [
        RBL_DISABLED,
        RBL_DISPLAY,
        RBL_SKIP,
        RBL_VALUE,
        RBL_LISTCONTROL,
        RBL_INPUT,
    ];
}

/// Row and column names read by the downstream passes.
pub mod downstream {
    /// `@id` of `jwt-data` rows pushed back to the service.
    pub const DATA_UPDATES_ID: &str = "data-updates";
    /// Generic API command receiving data tokens.
    pub const JWT_UPDATE_COMMAND: &str = "rble/jwtupdate";
    /// `action` value of document generation rows.
    pub const DOCGEN_ACTION: &str = "DocGen";
    pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";
    pub const DEFAULT_FILE_NAME: &str = "Download.pdf";
}

/// Processing phase tags reported with calculation and processing errors.
pub mod phases {
    pub const SUBMIT_CALCULATION: &str = "SubmitCalculation";
    pub const PROCESS_TABLE: &str = "ProcessTable";
    pub const PROCESS_DATA_UPDATE_RESULTS: &str = "ProcessDataUpdateResults";
    pub const PROCESS_DOCGEN_RESULTS: &str = "ProcessDocGenResults";
}

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Generic error.
    pub const ERROR_GENERIC: i32 = 1;
    /// One or more engines failed.
    pub const ERROR_CALCULATION: i32 = 2;
    /// Calculation succeeded but produced validation errors.
    pub const ERROR_VALIDATION: i32 = 3;
    /// Invalid configuration.
    pub const ERROR_CONFIG: i32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mergeable_tables_include_input_and_skip() {
        assert!(tables::MERGEABLE.contains(&tables::RBL_INPUT));
        assert!(tables::MERGEABLE.contains(&tables::RBL_SKIP));
        assert!(!tables::MERGEABLE.contains(&tables::RBL_DEFAULTS));
        assert!(!tables::MERGEABLE.contains(&tables::ERRORS));
    }
}
