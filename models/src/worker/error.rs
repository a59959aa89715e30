use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Worker timestamp '{}' is not in rfc3339 format: '{}'", timestamp, source))]
    TimestampFormat {
        timestamp: String,
        source: chrono::ParseError,
    },
}
