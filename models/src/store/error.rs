use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to get {} '{}': '{}'", kind, name, source))]
    GetObject {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to create {} '{}': '{}'", kind, name, source))]
    CreateObject {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to replace {} '{}': '{}'", kind, name, source))]
    ReplaceObject {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to replace status of {} '{}': '{}'", kind, name, source))]
    ReplaceStatus {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to apply {} '{}': '{}'", kind, name, source))]
    ApplyObject {
        kind: String,
        name: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to discover the resource serving {}: '{}'", kind, source))]
    ResolveKind { kind: String, source: kube::Error },

    #[snafu(display("{} object has no name", kind))]
    MissingName { kind: String },

    #[snafu(display("Unable to serialize {} '{}': '{}'", kind, name, source))]
    SerializeObject {
        kind: String,
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to convert object into {}: '{}'", kind, source))]
    ConvertObject {
        kind: String,
        source: serde_json::Error,
    },
}

impl Error {
    /// The HTTP status code returned by the API server, if the error came from one.
    pub fn api_code(&self) -> Option<u16> {
        let source = match self {
            Self::GetObject { source, .. }
            | Self::CreateObject { source, .. }
            | Self::ReplaceObject { source, .. }
            | Self::ReplaceStatus { source, .. }
            | Self::ApplyObject { source, .. }
            | Self::ResolveKind { source, .. } => source,
            _ => return None,
        };
        match source {
            kube::Error::Api(response) => Some(response.code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }
}
