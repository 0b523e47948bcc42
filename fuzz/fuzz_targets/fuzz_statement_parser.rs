// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for query statement parsing and LIKE pattern compilation

#![no_main]

use docstart_server::query;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing either succeeds or reports a coded error
        if let Err(err) = query::parse(s) {
            assert_eq!(err.code, query::SYNTAX_ERROR);
        }

        // Any short text is a valid LIKE pattern
        if s.len() < 256 {
            assert!(query::like_to_regex(s).is_ok());
        }
    }
});
