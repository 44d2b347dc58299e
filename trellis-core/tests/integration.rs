//! Integration Tests for the Reactive Renderer
//!
//! These tests verify that signals, memos, effects, the scheduler and the
//! render tree work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::prelude::*;
use trellis_core::render::NodeSnapshot;
use trellis_core::ReactiveError;

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

// ----------------------------------------------------------------------------
// Reactive core
// ----------------------------------------------------------------------------

/// Test that an effect only reacts to the branch it read last.
#[test]
fn dependencies_follow_the_last_run() {
    let rt = Runtime::new();
    let use_a = rt.signal(true);
    let a = rt.signal(1);
    let b = rt.signal(10);
    let runs = counter();

    let effect = rt.effect({
        let (use_a, a, b, runs) = (use_a.clone(), a.clone(), b.clone(), runs.clone());
        move || {
            runs.set(runs.get() + 1);
            if use_a.get() {
                a.get();
            } else {
                b.get();
            }
        }
    });
    assert_eq!(effect.dependency_count(), 2);
    assert_eq!(b.subscriber_count(), 0);

    use_a.set(false);
    rt.run_until_idle().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 1);

    // `a` is no longer read, so writing it does nothing.
    a.set(2);
    rt.run_until_idle().unwrap();
    assert_eq!(runs.get(), 2);

    b.set(11);
    rt.run_until_idle().unwrap();
    assert_eq!(runs.get(), 3);
}

/// Scenario: counter 1 -> 2 -> 2 with identical writes skipped.
#[test]
fn identical_writes_are_skipped() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(1);
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.effect({
        let seen = seen.clone();
        move || seen.borrow_mut().push(count.get())
    });

    set_count.set(2);
    rt.run_until_idle().unwrap();
    set_count.set(2);
    rt.run_until_idle().unwrap();

    assert_eq!(*seen.borrow(), vec![1, 2]);
}

/// Scenario: counter 1 -> 2 -> 2 notifies every time without the short-circuit.
#[test]
fn identical_writes_notify_when_always_notifying() {
    let rt = Runtime::with_config(RuntimeConfig {
        equality: EqualityPolicy::AlwaysNotify,
        ..RuntimeConfig::default()
    });
    let (count, set_count) = rt.create_signal(1);
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.effect({
        let seen = seen.clone();
        move || seen.borrow_mut().push(count.get())
    });

    set_count.set(2);
    rt.run_until_idle().unwrap();
    set_count.set(2);
    rt.run_until_idle().unwrap();

    assert_eq!(*seen.borrow(), vec![1, 2, 2]);
}

/// Test that many writes in one batch cause one run and one frame flush.
#[test]
fn writes_in_one_batch_coalesce() {
    let rt = Runtime::new();
    let a = rt.signal(0);
    let b = rt.signal(0);
    let runs = counter();

    rt.effect({
        let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
        move || {
            a.get();
            b.get();
            runs.set(runs.get() + 1);
        }
    });

    for i in 1..=50 {
        a.set(i);
        b.set(i * 2);
    }
    assert_eq!(runs.get(), 1);

    rt.run_until_idle().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(rt.frame_flushes(), 1);
}

/// Test that signal history is bounded and undo walks back through it.
#[test]
fn history_is_bounded_by_capacity() {
    let rt = Runtime::with_config(RuntimeConfig {
        history_capacity: 3,
        ..RuntimeConfig::minimal()
    });
    let signal = rt.signal(0);
    for i in 1..=5 {
        signal.set(i);
    }
    assert_eq!(signal.history_len(), 3);

    assert!(signal.undo());
    assert_eq!(signal.peek(), 4);
    assert!(signal.undo());
    assert!(signal.undo());
    assert_eq!(signal.peek(), 2);
    assert!(!signal.undo());
}

/// Test that disposing an effect twice is harmless and final.
#[test]
fn disposal_is_idempotent() {
    let rt = Runtime::new();
    let signal = rt.signal(0);
    let cleanups = counter();

    let effect = rt.create_effect({
        let (signal, cleanups) = (signal.clone(), cleanups.clone());
        move || {
            signal.get();
            let cleanups = cleanups.clone();
            Some(Box::new(move || cleanups.set(cleanups.get() + 1)) as Cleanup)
        }
    });

    effect.dispose();
    effect.dispose();
    assert_eq!(cleanups.get(), 1);
    assert_eq!(signal.subscriber_count(), 0);
    assert_eq!(rt.live_subscribers(), 0);

    signal.set(1);
    rt.run_until_idle().unwrap();
    assert_eq!(effect.run_count(), 1);
}

/// Scenario: memo c = a + b follows both inputs.
#[test]
fn memo_follows_inputs() {
    let rt = Runtime::new();
    let (a, set_a) = rt.create_signal(2);
    let (b, set_b) = rt.create_signal(3);
    let c = rt.create_memo(move || a.get() + b.get());
    assert_eq!(c.get(), 5);

    set_a.set(4);
    rt.run_until_idle().unwrap();
    assert_eq!(c.get(), 7);

    set_b.set(6);
    rt.run_until_idle().unwrap();
    assert_eq!(c.get(), 10);
    assert_eq!(c.compute_count(), 3);
}

/// Test that an effect reading a memo reruns when the memo changes.
#[test]
fn effects_see_memo_updates() {
    let rt = Runtime::with_config(RuntimeConfig::minimal());
    let (n, set_n) = rt.create_signal(1);
    let squared = rt.create_memo(move || n.get() * n.get());
    let seen = Rc::new(RefCell::new(Vec::new()));

    rt.effect({
        let (squared, seen) = (squared.clone(), seen.clone());
        move || seen.borrow_mut().push(squared.get())
    });

    set_n.set(3);
    assert_eq!(*seen.borrow(), vec![1, 9]);
}

/// Test that batched memo readers settle one frame after source readers.
#[test]
fn memo_readers_settle_on_the_following_frame() {
    let rt = Runtime::new();
    let (n, set_n) = rt.create_signal(2);
    let doubled = rt.create_memo({
        let n = n.clone();
        move || n.get() * 2
    });
    let direct = Rc::new(Cell::new(0));
    let derived = Rc::new(Cell::new(0));

    rt.effect({
        let (n, direct) = (n.clone(), direct.clone());
        move || direct.set(n.get())
    });
    rt.effect({
        let (doubled, derived) = (doubled.clone(), derived.clone());
        move || derived.set(doubled.get())
    });

    set_n.set(5);
    rt.tick();
    assert_eq!(direct.get(), 5);
    assert_eq!(derived.get(), 4);

    rt.tick();
    assert_eq!(derived.get(), 10);
    assert_eq!(rt.frame_flushes(), 2);
}

/// Test that a runaway loop is reported instead of spinning forever.
#[test]
fn runaway_effects_hit_the_flush_limit() {
    let rt = Runtime::with_config(RuntimeConfig {
        max_flush_rounds: 20,
        ..RuntimeConfig::default()
    });
    let a = rt.signal(0);
    let b = rt.signal(0);

    rt.effect({
        let (a, b) = (a.clone(), b.clone());
        move || b.set(a.get() + 1)
    });
    rt.effect({
        let (a, b) = (a.clone(), b.clone());
        move || a.set(b.get() + 1)
    });

    assert_eq!(
        rt.run_until_idle(),
        Err(ReactiveError::FlushLimit { rounds: 20 })
    );
}

/// Test that configuration can be loaded from JSON.
#[test]
fn config_loads_from_json() {
    let config = RuntimeConfig::from_json(
        r#"{ "equality": "always_notify", "flush_mode": "synchronous", "child_chunk_size": 4 }"#,
    )
    .unwrap();
    assert_eq!(config.equality, EqualityPolicy::AlwaysNotify);
    assert_eq!(config.flush_mode, FlushMode::Synchronous);
    assert_eq!(config.child_chunk_size, 4);
    assert_eq!(config.history_capacity, 10);

    assert!(RuntimeConfig::from_json(r#"{ "child_chunk_size": 0 }"#).is_err());
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

/// Scenario: a div with a reactive text child follows its signal.
#[test]
fn reactive_text_child_updates() {
    let rt = Runtime::new();
    let label = rt.signal("A".to_owned());
    let div = h(&rt, "div", None, vec![Child::from(label.clone())]);
    assert_eq!(div.to_html(), "<div>A</div>");

    label.set("B".to_owned());
    rt.run_until_idle().unwrap();
    assert_eq!(div.to_html(), "<div>B</div>");
}

/// Test that a marker region swaps three nodes for nothing and back.
#[test]
fn marker_region_swaps_content() {
    let rt = Runtime::new();
    let show = rt.signal(true);
    let list = h(
        &rt,
        "ul",
        None,
        vec![
            Child::from("start"),
            Child::reactive({
                let (rt, show) = (rt.downgrade(), show.clone());
                move || {
                    let Some(rt) = rt.upgrade() else {
                        return Child::Empty;
                    };
                    if show.get() {
                        Child::from(
                            (1..=3)
                                .map(|i| Child::from(h(&rt, "li", None, vec![Child::from(i)])))
                                .collect::<Vec<_>>(),
                        )
                    } else {
                        Child::Empty
                    }
                }
            }),
            Child::from("end"),
        ],
    );
    assert_eq!(
        list.to_html(),
        "<ul>start<li>1</li><li>2</li><li>3</li>end</ul>"
    );

    show.set(false);
    rt.run_until_idle().unwrap();
    assert_eq!(list.to_html(), "<ul>startend</ul>");
    // The removed items went back to the pool.
    assert_eq!(rt.pooled_elements(), 3);

    show.set(true);
    rt.run_until_idle().unwrap();
    assert_eq!(
        list.to_html(),
        "<ul>start<li>1</li><li>2</li><li>3</li>end</ul>"
    );
    assert_eq!(rt.pooled_elements(), 0);
}

/// Test that a counter button wires events to state and state to text.
#[test]
fn event_handlers_drive_updates() {
    let rt = Runtime::new();
    let (count, set_count) = rt.create_signal(0);
    let button = h(
        &rt,
        "button",
        Some(Props::new().on("click", move |_| set_count.update(|n| n + 1))),
        vec![Child::from("Clicked "), Child::from(count)],
    );

    button.dispatch(&Event::new("click"));
    button.dispatch(&Event::new("click"));
    rt.run_until_idle().unwrap();
    assert_eq!(button.text_content(), "Clicked 2");
}

/// Test that a component rendering a memo stays in sync.
#[test]
fn components_render_memos() {
    let rt = Runtime::new();
    let (price, set_price) = rt.create_signal(10);
    let with_tax = rt.create_memo(move || price.get() * 2);

    let label = ElementType::component(move |props: Props| {
        vec![
            Child::from(props.text("prefix").unwrap_or("").to_owned()),
            Child::from(with_tax.clone()),
        ]
    });
    let node = h(
        &rt,
        "p",
        None,
        vec![Child::from(build(&rt, label, Props::new().attr("prefix", "$")))],
    );
    assert_eq!(node.to_html(), "<p>$20</p>");

    set_price.set(21);
    rt.run_until_idle().unwrap();
    assert_eq!(node.to_html(), "<p>$42</p>");
}

/// Test that long child lists finish after idle time.
#[test]
fn large_child_lists_are_chunked() {
    let rt = Runtime::new();
    let items: Vec<Child> = (0..100)
        .map(|i| Child::from(h(&rt, "li", None, vec![Child::from(i)])))
        .collect();
    let list = h(&rt, "ul", None, vec![Child::from(items)]);

    assert_eq!(list.child_count(), 10);
    rt.run_until_idle().unwrap();
    assert_eq!(list.child_count(), 100);
    assert_eq!(list.children()[99].text_content(), "99");
}

/// Test that a component's long child list is not split across a fragment.
#[test]
fn component_lists_are_not_chunked_into_fragments() {
    let rt = Runtime::new();
    let rows = ElementType::component(|_| (0..25).map(Child::from).collect::<Vec<_>>());
    let root = h(&rt, "div", None, vec![Child::from(build(&rt, rows, Props::new()))]);

    rt.run_until_idle().unwrap();
    assert_eq!(root.child_count(), 25);
    assert_eq!(root.children()[24].text_content(), "24");
}

/// Test that nodes a region shows again keep their content and stay out of
/// the pool.
#[test]
fn region_reuses_prebuilt_nodes() {
    let rt = Runtime::new();
    let items: Vec<Node> = ["a", "b", "c"]
        .into_iter()
        .map(|id| h(&rt, "li", Some(Props::new().attr("id", id)), vec![Child::from(id)]))
        .collect();
    let count = rt.signal(3usize);
    let list = h(
        &rt,
        "ul",
        None,
        vec![Child::reactive({
            let (count, items) = (count.clone(), items.clone());
            move || Child::from(items[..count.get()].to_vec())
        })],
    );
    assert_eq!(list.text_content(), "abc");

    count.set(2);
    rt.run_until_idle().unwrap();
    assert_eq!(
        list.to_html(),
        r#"<ul><li id="a">a</li><li id="b">b</li></ul>"#
    );
    assert_eq!(rt.pooled_elements(), 1);

    // The pooled element is the dropped one, never a shown one.
    let fresh = h(&rt, "li", None, Vec::new());
    assert!(fresh.ptr_eq(&items[2]));
    assert_eq!(items[0].text_content(), "a");
}

/// Test that a region inside a region's fragment is cleared with it.
#[test]
fn nested_regions_clear_with_their_owner() {
    let rt = Runtime::new();
    let show = rt.signal(true);
    let label = rt.signal("x".to_owned());
    let root = h(
        &rt,
        "div",
        None,
        vec![Child::reactive({
            let (rt, show, label) = (rt.downgrade(), show.clone(), label.clone());
            move || {
                let Some(rt) = rt.upgrade() else {
                    return Child::Empty;
                };
                if !show.get() {
                    return Child::Empty;
                }
                Child::from(h(&rt, ElementType::Fragment, None, vec![Child::from(label.clone())]))
            }
        })],
    );
    rt.run_until_idle().unwrap();
    assert_eq!(root.to_html(), "<div>x</div>");

    label.set("y".to_owned());
    rt.run_until_idle().unwrap();
    assert_eq!(root.to_html(), "<div>y</div>");

    show.set(false);
    rt.run_until_idle().unwrap();
    assert_eq!(root.to_html(), "<div></div>");
    assert_eq!(label.subscriber_count(), 0);
}

/// Test that raw removals under an observed root still run cleanups.
#[test]
fn auto_cleanup_disposes_raw_removals() {
    let rt = Runtime::new();
    let value = rt.signal(1);
    let item = h(&rt, "li", None, vec![Child::from(value.clone())]);
    let root = h(&rt, "ul", None, vec![Child::from(&item)]);
    let observer = AutoCleanup::observe(&rt, &root);
    assert_eq!(value.subscriber_count(), 1);

    item.remove().unwrap();
    rt.run_until_idle().unwrap();

    assert!(item.is_disposed());
    assert_eq!(value.subscriber_count(), 0);
    assert_eq!(observer.disposed_count(), 1);
}

/// Test that pooled elements never leak state into their next use.
#[test]
fn pooled_elements_start_clean() {
    let rt = Runtime::new();
    let clicks = counter();
    let old = h(
        &rt,
        "div",
        Some(Props::new().class("old").style([("color", "red")]).on("click", {
            let clicks = clicks.clone();
            move |_| clicks.set(clicks.get() + 1)
        })),
        vec![Child::from("old")],
    );
    old.detach(&rt);

    let fresh = h(&rt, "div", Some(Props::new().attr("id", "fresh")), Vec::new());
    assert!(fresh.ptr_eq(&old));
    assert_eq!(fresh.to_html(), "<div id=\"fresh\"></div>");
    assert_eq!(fresh.dispatch(&Event::new("click")), 0);
    assert_eq!(clicks.get(), 0);
}

/// Test that render trees can be captured as serializable snapshots.
#[test]
fn snapshots_capture_structure() {
    let rt = Runtime::new();
    let node = h(
        &rt,
        "svg",
        Some(Props::new().attr("width", 10)),
        vec![Child::from(build(&rt, "circle", Props::new().attr("r", 4)))],
    );

    match node.snapshot() {
        NodeSnapshot::Element {
            tag,
            attributes,
            children,
            ..
        } => {
            assert_eq!(tag, "svg");
            assert_eq!(attributes, vec![("width".to_owned(), "10".to_owned())]);
            assert_eq!(children.len(), 1);
        }
        other => panic!("expected element, got {:?}", other),
    }
    let json = serde_json::to_string(&node.snapshot()).unwrap();
    assert!(json.contains("\"namespace\":\"svg\""));
}
