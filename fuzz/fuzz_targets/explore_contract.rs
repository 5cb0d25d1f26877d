#![no_main]
use libfuzzer_sys::fuzz_target;
use simex_mc::ExploreConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(backend) = simex_vm::VmBackend::from_json(s) {
            let meta = backend.metadata();
            let config = ExploreConfig {
                max_states: 200,
                max_depth: 6,
                parallel: false,
                ..ExploreConfig::default()
            };
            if let Ok(stream) = simex_mc::simulation_examples(&meta, &meta, &backend, &backend, &config) {
                let _ = simex_mc::ExampleSet::collect(stream);
            }
        }
    }
});
