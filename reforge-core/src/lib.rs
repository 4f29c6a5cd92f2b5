pub mod envelope;
pub mod error;
pub mod model;
pub mod options;

pub use envelope::{decode_envelope, encode_envelope};
pub use error::{EnvelopeError, ErrorClass, OptionsError, ResolutionError};
pub use model::{
    ConditionalValue, ConfigEntry, ConfigRow, ConfigServicePointer, ConfigType, ConfigValue,
    Configs, LogLevelValue, index_by_key,
};
pub use options::{Datasources, OnConnectionFailure, OnNoDefault, Options, OptionsBuilder, ReadyCallback};
