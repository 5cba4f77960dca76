//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that observable values, effects, signals, memos,
//! watchers, and the job scheduler work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::reactive::{
    effect, reactive, readonly, untracked, watch, watch_fn, Memo, ObjRef, Signal, Value,
    WatchOptions,
};
use trellis_core::scheduler::{flush_jobs, flush_pending, queued_job_count};

fn obj_with(pairs: &[(&str, Value)]) -> Value {
    let obj = ObjRef::new();
    for (key, value) in pairs {
        obj.insert(*key, value.clone());
    }
    Value::Obj(obj)
}

fn observed(value: Value) -> trellis_core::reactive::Reactive {
    reactive(value)
        .as_reactive()
        .expect("container should wrap")
        .clone()
}

/// An effect over an observable object re-runs for the entries it read and
/// only for real changes.
#[test]
fn effect_tracks_object_reads() {
    let state = observed(obj_with(&[("count", Value::Int(0)), ("label", Value::from("x"))]));
    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let seen_inner = seen.clone();
    let reader = state.clone();
    effect(move || {
        seen_inner.borrow_mut().push(reader.get("count"));
    });
    assert_eq!(&*seen.borrow(), &[Value::Int(0)]);

    state.set("count", 1i64);
    assert_eq!(&*seen.borrow(), &[Value::Int(0), Value::Int(1)]);

    // A write to an unread entry is invisible.
    state.set("label", "y");
    assert_eq!(seen.borrow().len(), 2);

    // A same-value write is invisible too.
    state.set("count", 1i64);
    assert_eq!(seen.borrow().len(), 2);
}

/// Nested effects run depth-first, and the outer effect keeps collecting
/// its own dependencies after the inner one finishes.
#[test]
fn nested_effects_restore_the_outer_scope() {
    let state = observed(obj_with(&[("a", Value::Int(0)), ("b", Value::Int(0))]));
    let outer_runs = Rc::new(Cell::new(0));
    let inner_runs = Rc::new(Cell::new(0));

    let (outer_counter, inner_counter) = (outer_runs.clone(), inner_runs.clone());
    let reader = state.clone();
    effect(move || {
        outer_counter.set(outer_counter.get() + 1);

        let inner_reader = reader.clone();
        let inner_counter = inner_counter.clone();
        effect(move || {
            inner_reader.get("b");
            inner_counter.set(inner_counter.get() + 1);
        });

        // Read after the inner effect completes: this must subscribe the
        // outer effect, not the inner one.
        reader.get("a");
    });
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

    state.set("b", 1i64);
    assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

    // The outer re-run creates a fresh inner effect, which runs once.
    state.set("a", 1i64);
    assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));
}

/// Reads inside `untracked` subscribe nothing.
#[test]
fn untracked_reads_do_not_subscribe() {
    let state = observed(obj_with(&[("watched", Value::Int(0)), ("peeked", Value::Int(0))]));
    let runs = Rc::new(Cell::new(0));

    let counter = runs.clone();
    let reader = state.clone();
    effect(move || {
        reader.get("watched");
        untracked(|| reader.get("peeked"));
        counter.set(counter.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    state.set("peeked", 1i64);
    assert_eq!(runs.get(), 1);

    state.set("watched", 1i64);
    assert_eq!(runs.get(), 2);
}

/// A read-only view shares the live tree: it sees mutations made through a
/// mutable wrapper, while its entry reads subscribe to nothing and its
/// writes change nothing.
#[test]
fn readonly_views_share_the_live_tree() {
    let raw = obj_with(&[("x", Value::Int(1))]);
    let live = observed(raw.clone());
    let frozen = readonly(raw).as_reactive().unwrap().clone();

    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let reader = frozen.clone();
    effect(move || {
        reader.get("x");
        counter.set(counter.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    live.set("x", 2i64);
    assert_eq!(runs.get(), 1);
    assert_eq!(frozen.get("x"), Value::Int(2));

    // Writes through the frozen view change nothing.
    frozen.set("x", 99i64);
    assert_eq!(frozen.get("x"), Value::Int(2));
}

/// Signal -> memo -> effect: the memo stays lazy and the effect still sees
/// every net change.
#[test]
fn signal_memo_effect_chain() {
    let base = Signal::new(5);

    let base_reader = base.clone();
    let doubled = Memo::new(move || {
        Value::Int(base_reader.get().as_int().unwrap_or(0) * 2)
    });

    let seen: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_inner = seen.clone();
    let memo_reader = doubled.clone();
    effect(move || {
        seen_inner.borrow_mut().push(memo_reader.get());
    });
    assert_eq!(&*seen.borrow(), &[Value::Int(10)]);
    assert_eq!(doubled.run_count(), 1);

    base.set(10);
    assert_eq!(&*seen.borrow(), &[Value::Int(10), Value::Int(20)]);
    assert_eq!(doubled.run_count(), 2);
}

/// Observable state -> memo -> post-flush watcher: a burst of writes costs
/// one recompute and delivers one callback.
#[test]
fn state_memo_watcher_pipeline() {
    let state = observed(obj_with(&[("first", Value::from("Ada")), ("last", Value::from("L"))]));

    let reader = state.clone();
    let full_name = Memo::new(move || {
        let first = reader.get("first");
        let last = reader.get("last");
        Value::from(format!(
            "{} {}",
            first.as_str().unwrap_or(""),
            last.as_str().unwrap_or("")
        ))
    });

    let deliveries: Rc<RefCell<Vec<(Value, Option<Value>)>>> = Rc::new(RefCell::new(Vec::new()));
    let log = deliveries.clone();
    let _handle = watch(
        &full_name,
        move |new, old| log.borrow_mut().push((new, old)),
        WatchOptions::post(),
    );
    assert_eq!(full_name.run_count(), 1);

    state.set("first", "Grace");
    state.set("last", "Hopper");
    assert!(deliveries.borrow().is_empty());
    assert!(flush_pending());
    assert_eq!(queued_job_count(), 1);

    flush_jobs();
    assert_eq!(
        &*deliveries.borrow(),
        &[(Value::from("Grace Hopper"), Some(Value::from("Ada L")))]
    );
    // One recompute for the prime, one for the flush.
    assert_eq!(full_name.run_count(), 2);
}

/// The async flush helper drains the queue after yielding once, so every
/// synchronous write in the turn lands first.
#[tokio::test]
async fn writes_batch_across_a_yield() {
    let counter = Signal::new(0);
    let deliveries: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let log = deliveries.clone();
    let _handle = watch(
        &counter,
        move |new, _old| log.borrow_mut().push(new),
        WatchOptions::post(),
    );

    for n in 1..=4 {
        counter.set(n);
    }
    assert!(deliveries.borrow().is_empty());

    let ran = trellis_core::scheduler::flush_after_yield().await;
    assert_eq!(ran, 1);
    assert_eq!(&*deliveries.borrow(), &[Value::Int(4)]);
    assert!(!flush_pending());
}

/// A rendering effect over an array follows pushes, replacements, pops and
/// shifts. Each raw trigger re-runs it once against the settled contents.
#[test]
fn array_edits_drive_a_rendering_effect() {
    let list = observed(Value::from(vec![Value::from("a"), Value::from("b")]));
    let frames: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let frames_inner = frames.clone();
    let reader = list.clone();
    effect(move || {
        let frame = reader
            .values()
            .iter()
            .map(|v| v.as_str().unwrap_or("?").to_string())
            .collect::<Vec<_>>()
            .join(",");
        frames_inner.borrow_mut().push(frame);
    });
    assert_eq!(&*frames.borrow(), &["a,b"]);

    list.push("c");
    assert_eq!(frames.borrow().last().map(String::as_str), Some("a,b,c"));

    list.splice(1, 1, vec![Value::from("X")]);
    assert_eq!(frames.borrow().last().map(String::as_str), Some("a,X,c"));

    list.pop();
    assert_eq!(frames.borrow().last().map(String::as_str), Some("a,X"));

    // The shift lands as one replace and one shrink; both re-runs see the
    // already-settled contents.
    list.shift();
    assert_eq!(&*frames.borrow(), &["a,b", "a,b,c", "a,X,c", "a,X", "X", "X"]);
}

/// Array searches stay correct as the array is edited around the needle.
#[test]
fn search_positions_follow_edits() {
    let list = observed(Value::from(vec![Value::from("needle")]));
    let positions: Rc<RefCell<Vec<Option<usize>>>> = Rc::new(RefCell::new(Vec::new()));

    let positions_inner = positions.clone();
    let reader = list.clone();
    effect(move || {
        positions_inner
            .borrow_mut()
            .push(reader.index_of(&Value::from("needle")));
    });
    assert_eq!(&*positions.borrow(), &[Some(0)]);

    // The prepend lands as a replace plus a grow, so the search re-runs
    // twice against the settled contents.
    list.unshift("padding");
    assert_eq!(&*positions.borrow(), &[Some(0), Some(1), Some(1)]);

    list.remove(1usize);
    assert_eq!(positions.borrow().last(), Some(&None));
}

/// Map and set state feed effects the same way objects do.
#[test]
fn keyed_collections_feed_effects() {
    let scores = observed(Value::map());
    let tags = observed(Value::set());

    let totals: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
    let totals_inner = totals.clone();
    let score_reader = scores.clone();
    effect(move || {
        let total = score_reader
            .values()
            .iter()
            .filter_map(|v| v.as_int())
            .sum::<i64>();
        totals_inner.borrow_mut().push(total);
    });

    let tag_counts: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let tag_counts_inner = tag_counts.clone();
    let tag_reader = tags.clone();
    effect(move || {
        tag_counts_inner.borrow_mut().push(tag_reader.len());
    });

    scores.set(Value::from("ada"), 3i64);
    scores.set(Value::from("grace"), 4i64);
    assert_eq!(totals.borrow().last(), Some(&7));

    // Updating an existing entry reaches the iterating effect.
    scores.set(Value::from("ada"), 5i64);
    assert_eq!(totals.borrow().last(), Some(&9));

    scores.remove(Value::from("grace"));
    assert_eq!(totals.borrow().last(), Some(&5));

    tags.add("alpha");
    tags.add("beta");
    tags.add("alpha");
    assert_eq!(&*tag_counts.borrow(), &[0, 1, 2]);
}

/// A watcher over a joint getter sees one net change per flush no matter
/// how the underlying pieces moved.
#[test]
fn joint_getter_watcher_sees_net_changes() {
    let width = Signal::new(2);
    let height = Signal::new(3);
    let areas: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));

    let (w, h) = (width.clone(), height.clone());
    let log = areas.clone();
    let _handle = watch_fn(
        move || {
            Value::Int(w.get().as_int().unwrap_or(0) * h.get().as_int().unwrap_or(0))
        },
        move |new, _old| log.borrow_mut().push(new),
        WatchOptions::post(),
    );

    // 2x3 -> 3x2: the area is unchanged, so the flush delivers nothing.
    width.set(3);
    height.set(2);
    flush_jobs();
    assert!(areas.borrow().is_empty());

    width.set(5);
    flush_jobs();
    assert_eq!(&*areas.borrow(), &[Value::Int(10)]);
}

/// Stopping a watcher mid-burst voids its queued delivery.
#[test]
fn stopped_watchers_are_quiet_even_when_queued() {
    let source = Signal::new(0);
    let deliveries = Rc::new(Cell::new(0));

    let count = deliveries.clone();
    let handle = watch(
        &source,
        move |_new, _old| count.set(count.get() + 1),
        WatchOptions::post(),
    );

    source.set(1);
    assert_eq!(queued_job_count(), 1);

    handle.stop();
    flush_jobs();
    assert_eq!(deliveries.get(), 0);

    source.set(2);
    flush_jobs();
    assert_eq!(deliveries.get(), 0);
}

/// Deep state handed out by a signal keeps the whole pipeline live: a
/// nested write reaches a watcher of a derived value.
#[test]
fn deep_state_through_a_signal_reaches_watchers() {
    let profile = Signal::new(obj_with(&[(
        "user",
        obj_with(&[("name", Value::from("ada"))]),
    )]));

    let reader = profile.clone();
    let display = Memo::new(move || {
        let root = reader.get();
        let root = match root.as_reactive() {
            Some(wrapper) => wrapper.clone(),
            None => return Value::Null,
        };
        let user = root.get("user");
        match user.as_reactive() {
            Some(user) => user.get("name"),
            None => Value::Null,
        }
    });

    let names: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(Vec::new()));
    let log = names.clone();
    let _handle = watch(
        &display,
        move |new, _old| log.borrow_mut().push(new),
        WatchOptions::default(),
    );

    // Mutate two levels down through the signal's wrapper.
    let root = profile.get();
    let root = root.as_reactive().unwrap();
    let user = root.get("user");
    user.as_reactive().unwrap().set("name", "grace");

    assert_eq!(&*names.borrow(), &[Value::from("grace")]);
}
