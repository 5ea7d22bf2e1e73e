pub mod icmp;
pub mod test_case;
pub mod tls;

pub use test_case::{TestCase, TestCaseState};
