#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Flux CSV bodies and FuelCheck timestamps both arrive from the network
    let _ = fuelwatch::sink::influx::parse_query_csv(text);
    let _ = fuelwatch::source::nsw::parse_last_updated(text);
});
