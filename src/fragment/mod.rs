pub mod codec;
pub mod error;
pub mod reassembly;

pub use codec::{
    encode, is_fragment, parse_header, reassemble, FragmentHeader, ParsedFragment,
    FRAGMENT_PREFIX, FRAGMENT_TERMINATOR,
};
pub use error::{FragmentError, FragmentResult};
pub use reassembly::{ReassemblyEntry, ReassemblyTracker, DEFAULT_REASSEMBLY_TIMEOUT};
