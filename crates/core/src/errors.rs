use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("step `{step_id}` is incomplete: {message}")]
    IncompleteConfiguration { step_id: String, message: String },
}

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;
    use crate::flows::FlowTransitionError;

    #[test]
    fn incomplete_configuration_names_the_step() {
        let error = DomainError::IncompleteConfiguration {
            step_id: "sauces".to_owned(),
            message: "Please select at least 1 option for sauces.".to_owned(),
        };

        assert_eq!(
            error.to_string(),
            "step `sauces` is incomplete: Please select at least 1 option for sauces."
        );
    }

    #[test]
    fn flow_errors_convert_transparently() {
        let error = DomainError::from(FlowTransitionError::UnknownStep {
            step_id: "drinks".to_owned(),
        });

        assert!(matches!(error, DomainError::FlowTransition(_)));
        assert_eq!(error.to_string(), "step `drinks` is not part of this flow");
    }
}
