//! Statline core types: endpoint descriptors, typed rows, resolved parameters and errors.

#![forbid(unsafe_code)]

pub mod clock;
pub mod descriptor;
pub mod error;
pub mod params;
pub mod row;

pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::*;
pub use error::{DescriptorError, ValidationError};
pub use params::{CacheKey, ResolvedParams};
pub use row::{Cell, Row};

pub mod prelude {
    pub use super::{
        CacheKey, CachingPolicy, Cell, EndpointDescriptor, ParamType, ParameterDescriptor, ResolvedParams,
        ResponseShape, Row,
    };
}
