#![no_main]

//! Fuzz target for path pattern parsing and matching.
//!
//! Patterns come from configuration and paths come from clients, so neither
//! may panic or blow up on adversarial input such as long runs of `*`.

use libfuzzer_sys::fuzz_target;
use tollgate_core::{PathPattern, PathSet};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    // First line is the pattern, the rest are request paths.
    let mut lines = input.lines();
    let Some(raw_pattern) = lines.next() else {
        return;
    };

    let Ok(pattern) = PathPattern::parse(raw_pattern) else {
        return;
    };
    assert_eq!(pattern.as_str(), raw_pattern);

    let set = PathSet::parse([raw_pattern]).expect("pattern parsed once already");
    for path in lines {
        assert_eq!(pattern.matches(path), set.matches(path));
    }

    // `/**` appended to a pattern never narrows it.
    if !raw_pattern.ends_with("/**") {
        if let Ok(wider) = PathPattern::parse(&format!("{}/**", raw_pattern.trim_end_matches('/'))) {
            for path in input.lines().skip(1) {
                if pattern.matches(path) {
                    assert!(wider.matches(path), "{raw_pattern} matched {path} but /** did not");
                }
            }
        }
    }
});
