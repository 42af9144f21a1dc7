//! Error handling and exit codes.

use calcflow_core::constants::exit_codes;
use calcflow_core::CalcError;

/// Map an error to the process exit code.
#[must_use]
pub fn exit_code(err: &CalcError) -> i32 {
    match err {
        CalcError::Configuration(_) => exit_codes::ERROR_CONFIG,
        CalcError::Calculation(_) => exit_codes::ERROR_CALCULATION,
        CalcError::Processing { .. } | CalcError::Transport(_) | CalcError::Serialization(_) => {
            exit_codes::ERROR_GENERIC
        }
    }
}

/// Exit code for a top-level error, looking through `anyhow` context.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CalcError>())
        .map_or(exit_codes::ERROR_GENERIC, exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use calcflow_core::CalculationError;

    #[test]
    fn error_codes() {
        assert_eq!(exit_code(&CalcError::Configuration("bad".into())), 4);
        assert_eq!(exit_code(&CalcError::Calculation(CalculationError::new(Vec::new()))), 2);
        assert_eq!(exit_code(&CalcError::Transport("down".into())), 1);
    }

    #[test]
    fn context_is_transparent() {
        let err: anyhow::Result<()> = Err(CalcError::Configuration("bad".into())).context("loading engines");
        assert_eq!(exit_code_for(&err.unwrap_err()), 4);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }
}
