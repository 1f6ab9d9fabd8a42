#![no_main]

use cilguard::{AssemblyChecker, SandboxConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let config = SandboxConfig::default();
    let _ = AssemblyChecker::new(&config).check_bytes(data.to_vec());
});
