use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Round \"{0}\" must set either txDuration or txNumber")]
    MissingRoundLength(String),

    #[error("Round \"{0}\" sets both txDuration and txNumber")]
    AmbiguousRoundLength(String),

    #[error("Benchmark must use at least one worker")]
    NoWorkers,
}
