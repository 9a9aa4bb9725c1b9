/*!
# Gatewatch DevKit - Fixtures for collector and exporter tests

Lets tests run a full collection tick without a real gateway:
- A throwaway `/proc` + `/sys` tree with the counter files the collector reads
- Builders for connection-tracking lines, processes and reservation files
- Tracing setup that plays well with the test harness
*/

pub mod conntrack;
pub mod fake_kernel;
pub mod process;
pub mod test_utils;

pub use conntrack::ConntrackLine;
pub use fake_kernel::FakeKernel;
pub use process::FakeProcess;
pub use test_utils::init_test_tracing;
