mod common;

use common::element;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spritegen_core::error::SpriteError;
use spritegen_core::model::{Rect, SpriteElement};
use spritegen_core::packer::{extent, layout_elements};
use std::collections::HashMap;

fn rects(elements: &[SpriteElement]) -> HashMap<String, Rect> {
    elements.iter().map(|e| (e.name.clone(), e.rect)).collect()
}

fn disjoint(elements: &[SpriteElement]) -> bool {
    for i in 0..elements.len() {
        for j in (i + 1)..elements.len() {
            if elements[i].rect.intersects(&elements[j].rect) {
                return false;
            }
        }
    }
    true
}

#[test]
fn three_element_fixture_extent() {
    let mut els = vec![
        element("a", 30, 10, 0),
        element("b", 20, 15, 0),
        element("c", 10, 5, 0),
    ];
    let (w, h) = layout_elements(&mut els).expect("layout");

    // squarest first: b (0.75), c (0.5), a (0.33)
    let order: Vec<&str> = els.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(order, vec!["b", "c", "a"]);

    let r = rects(&els);
    assert_eq!(r["b"], Rect::new(0, 0, 20, 15));
    assert_eq!(r["c"], Rect::new(20, 0, 10, 5));
    assert_eq!(r["a"], Rect::new(0, 15, 30, 10));

    assert_eq!((w, h), (30, 25));
    assert_eq!(
        w,
        els.iter().map(|e| e.rect.x + e.rect.w).max().unwrap()
    );
    assert_eq!(
        h,
        els.iter().map(|e| e.rect.y + e.rect.h).max().unwrap()
    );
    assert!(disjoint(&els));
}

#[test]
fn relayout_is_idempotent() {
    let mut els = vec![
        element("wide", 64, 8, 1),
        element("square", 16, 16, 1),
        element("tall", 8, 40, 1),
        element("small", 4, 4, 1),
        element("mid", 24, 20, 1),
    ];
    let first_extent = layout_elements(&mut els).expect("first");
    let first = rects(&els);
    let second_extent = layout_elements(&mut els).expect("second");
    assert_eq!(first_extent, second_extent);
    assert_eq!(first, rects(&els));
}

#[test]
fn empty_input_is_rejected() {
    let mut els: Vec<SpriteElement> = Vec::new();
    match layout_elements(&mut els) {
        Err(SpriteError::Empty) => {}
        other => panic!("expected Empty, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn ties_break_by_area_then_name() {
    let mut els = vec![
        element("b", 8, 8, 0),
        element("a", 8, 8, 0),
        element("big", 16, 16, 0),
    ];
    layout_elements(&mut els).unwrap();
    let order: Vec<&str> = els.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(order, vec!["big", "a", "b"]);
}

#[test]
fn single_element_sits_at_origin() {
    let mut els = vec![element("only", 7, 3, 2)];
    let (w, h) = layout_elements(&mut els).unwrap();
    assert_eq!(els[0].rect, Rect::new(0, 0, 11, 7));
    assert_eq!((w, h), (11, 7));
}

#[test]
fn random_sets_never_overlap() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let n = rng.gen_range(1..=40);
        let border = rng.gen_range(0..=2);
        let mut els: Vec<SpriteElement> = (0..n)
            .map(|i| {
                element(
                    &format!("e{}", i),
                    rng.gen_range(1..=64),
                    rng.gen_range(1..=64),
                    border,
                )
            })
            .collect();
        let widest = els.iter().map(|e| e.rect.w).max().unwrap();
        let (w, h) = layout_elements(&mut els).unwrap();
        assert_eq!(els.len(), n);
        assert!(disjoint(&els), "overlap in set of {}", n);
        assert_eq!((w, h), extent(&els));
        assert_eq!(w, widest, "rows never exceed the widest element");
        for e in &els {
            assert!(e.rect.right() <= w && e.rect.bottom() <= h);
        }
    }
}
