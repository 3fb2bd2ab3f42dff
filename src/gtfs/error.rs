/// Errors raised while loading or decoding GTFS data.
///
/// Static-schedule loads propagate these to the caller. The realtime
/// provider catches them at its boundary and degrades to an empty feed.
#[derive(Debug, thiserror::Error)]
pub enum GtfsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Network error: {0}")]
    NetworkMessage(String),
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Required table {0} is missing from the GTFS feed")]
    MissingTable(&'static str),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Loader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
