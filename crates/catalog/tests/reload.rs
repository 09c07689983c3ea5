use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use statline_catalog::{Catalog, CatalogError};

const FOOTBALL: &str = include_str!("../../../descriptors/football.yaml");

const SMALL: &str = "namespace: football\nendpoints:\n  - { id: a, path: /a, category: x }\n  - { id: b, path: /b, category: x }\n";
const LARGE: &str = "namespace: football\nendpoints:\n  - { id: c, path: /c, category: y }\n  - { id: d, path: /d, category: y }\n  - { id: e, path: /e, category: y }\n";

#[test]
fn failed_reload_keeps_previous_catalog() {
    let catalog = Catalog::from_source(FOOTBALL).unwrap();
    let before = catalog.len();
    let epoch = catalog.current().epoch;

    let broken = "namespace: football\nendpoints:\n  - { id: fresh, path: /fresh, category: x }\n  - { path: /nope, category: x }\n";
    let err = catalog.load_str(broken).unwrap_err();
    assert!(matches!(err, CatalogError::Load(_)));

    assert_eq!(catalog.len(), before);
    assert_eq!(catalog.current().epoch, epoch);
    assert!(catalog.get("fixtures-by-league").is_ok());
    assert!(matches!(catalog.get("fresh"), Err(CatalogError::NotFound(_))));
}

#[test]
fn successful_reload_replaces_everything() {
    let catalog = Catalog::from_source(FOOTBALL).unwrap();
    catalog.load_str(SMALL).unwrap();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.get("fixtures-by-league").is_err());
    assert_eq!(catalog.current().epoch, 2);
}

#[test]
fn readers_never_observe_a_torn_catalog() {
    let catalog = Arc::new(Catalog::from_source(SMALL).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let snap = catalog.current();
                    let ids: Vec<String> = snap.all().iter().map(|d| d.id.clone()).collect();
                    let ok = ids == ["a", "b"] || ids == ["c", "d", "e"];
                    assert!(ok, "torn catalog: {:?}", ids);
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for i in 0..200 {
        let doc = if i % 2 == 0 { LARGE } else { SMALL };
        catalog.load_str(doc).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
}
