#![no_main]

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use medseq::contracts::ScopeKind;
use medseq::scope::ScopeResolver;

fuzz_target!(|data: &[u8]| {
    // Fuzz department codes and namespaces with arbitrary strings
    let input = String::from_utf8_lossy(data);
    let (namespace, department) = input.split_once('\n').unwrap_or(("token", &input));

    let resolver = ScopeResolver::utc();
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

    for kind in [ScopeKind::Department, ScopeKind::Global, ScopeKind::Perpetual] {
        if let Ok(scope) = resolver.resolve(namespace, kind, now, Some(department)) {
            // An accepted key never carries more segments than its layout allows
            assert!(scope.key.as_str().split(':').count() <= 3);
            assert!(scope.key.as_str().starts_with(namespace));
        }
    }
});
