use any_spawner::Executor;
use async_computed::{
    computed::{ArcAsyncComputed, AsyncComputedOptions, AsyncComputedState},
    prelude::*,
    ComputeError,
};
use reactive_graph::{
    effect::ImmediateEffect,
    owner::{on_cleanup, Owner},
    signal::ArcRwSignal,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn slow_counter(
    input: &ArcRwSignal<i32>,
    calls: &Arc<AtomicUsize>,
    cancels: &Arc<AtomicUsize>,
) -> ArcAsyncComputed<i32> {
    let input = input.clone();
    let calls = Arc::clone(calls);
    let cancels = Arc::clone(cancels);
    ArcAsyncComputed::new(0, move |cancel| {
        calls.fetch_add(1, Ordering::Relaxed);
        let cancels = Arc::clone(&cancels);
        cancel.on_cancel(move || {
            cancels.fetch_add(1, Ordering::Relaxed);
        });
        let n = input.get();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            n
        }
    })
}

#[tokio::test]
async fn owner_cleanup_cancels_and_stops() {
    _ = Executor::init_tokio();

    let owner = Owner::new();
    let input = ArcRwSignal::new(1i32);
    let calls = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    let value = owner.with(|| slow_counter(&input, &calls, &cancels));
    assert!(value.is_evaluating());

    owner.cleanup();
    assert_eq!(cancels.load(Ordering::Relaxed), 1);
    assert!(value.is_disposed());
    assert!(!value.is_evaluating());
    assert_eq!(value.state(), AsyncComputedState::Disposed);

    input.set(2i32);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(cancels.load(Ordering::Relaxed), 1);
    // the outstanding round settled, but was not committed
    assert_eq!(value.try_get_untracked(), None);
    assert!(matches!(value.clone().await, Err(ComputeError::Disposed)));
}

#[tokio::test]
async fn dispose_wakes_pending_waiters() {
    _ = Executor::init_tokio();

    let input = ArcRwSignal::new(1i32);
    let calls = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    let value = slow_counter(&input, &calls, &cancels);

    let waiter = tokio::spawn(value.settled());
    tick().await;
    value.clone().dispose();

    let outcome = waiter.await.unwrap();
    assert!(matches!(outcome, Err(ComputeError::Disposed)));
    assert_eq!(cancels.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn dispose_after_settling_cancels_nothing() {
    _ = Executor::init_tokio();

    let input = ArcRwSignal::new(1i32);
    let calls = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    let value = slow_counter(&input, &calls, &cancels);
    assert_eq!(value.clone().await.unwrap(), 1);

    value.clone().dispose();
    // disposing twice is harmless
    value.clone().dispose();
    assert_eq!(cancels.load(Ordering::Relaxed), 0);

    input.set(5i32);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn dropping_the_last_handle_cancels() {
    _ = Executor::init_tokio();

    let input = ArcRwSignal::new(1i32);
    let calls = Arc::new(AtomicUsize::new(0));
    let cancels = Arc::new(AtomicUsize::new(0));
    let value = slow_counter(&input, &calls, &cancels);
    drop(value);

    assert_eq!(cancels.load(Ordering::Relaxed), 1);
    input.set(2i32);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn evaluator_scope_is_cleaned_up_between_rounds() {
    _ = Executor::init_tokio();

    let input = ArcRwSignal::new(1i32);
    let cleanups = Arc::new(AtomicUsize::new(0));
    let value = ArcAsyncComputed::new(0, {
        let input = input.clone();
        let cleanups = Arc::clone(&cleanups);
        move |_| {
            let n = input.get();
            let cleanups = Arc::clone(&cleanups);
            on_cleanup(move || {
                cleanups.fetch_add(1, Ordering::Relaxed);
            });
            async move { n }
        }
    });

    input.set(2i32);
    input.set(3i32);
    assert_eq!(cleanups.load(Ordering::Relaxed), 2);

    value.dispose();
    assert_eq!(cleanups.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn effects_created_by_evaluator_stop_with_the_round() {
    _ = Executor::init_tokio();

    let input = ArcRwSignal::new(1i32);
    let other = ArcRwSignal::new(0i32);
    let runs = Arc::new(AtomicUsize::new(0));
    let value = ArcAsyncComputed::new(0, {
        let (input, other) = (input.clone(), other.clone());
        let runs = Arc::clone(&runs);
        move |_| {
            let n = input.get();
            ImmediateEffect::new({
                let other = other.clone();
                let runs = Arc::clone(&runs);
                move || {
                    other.track();
                    runs.fetch_add(1, Ordering::Relaxed);
                }
            });
            async move { n }
        }
    });
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // a new round cleans up the first round's scope, which disposes its effect
    input.set(2i32);
    assert_eq!(runs.load(Ordering::Relaxed), 2);

    // only the second round's effect is still subscribed
    other.set(1i32);
    assert_eq!(runs.load(Ordering::Relaxed), 3);
    assert_eq!(value.get_untracked(), 2);
}

#[tokio::test]
async fn supplied_evaluating_signal_is_mirrored() {
    _ = Executor::init_tokio();

    let loading = ArcRwSignal::new(true);
    let input = ArcRwSignal::new(1i32);
    let value = ArcAsyncComputed::with_options(
        0,
        AsyncComputedOptions::new().lazy(true).evaluating(loading.clone()),
        {
            let input = input.clone();
            move |_| {
                let n = input.get();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, std::convert::Infallible>(n)
                }
            }
        },
    );
    // lazy and never read, so not evaluating
    assert!(!loading.get_untracked());

    value.get_untracked();
    assert!(loading.get_untracked());
    assert_eq!(value.clone().await.unwrap(), 1);
    assert!(!loading.get_untracked());

    let owner = Owner::new();
    owner.with(|| {
        let value = value.clone();
        on_cleanup(move || value.dispose());
    });
    value.get_untracked();
    input.set(2i32);
    value.get_untracked();
    assert!(loading.get_untracked());
    owner.cleanup();
    assert!(!loading.get_untracked());
}
