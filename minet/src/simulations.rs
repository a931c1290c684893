//! Various prebuilt simulation setups for testing and examples.

mod forwarding;
pub use forwarding::forwarding;

mod round_robin;
pub use round_robin::round_robin;

mod fragmentation;
pub use fragmentation::fragmentation;

mod path_vector_line;
pub use path_vector_line::path_vector_line;

mod path_vector_ring;
pub use path_vector_ring::path_vector_ring;

mod path_vector_reload;
pub use path_vector_reload::path_vector_reload;
