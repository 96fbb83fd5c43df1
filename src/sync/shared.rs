//! Atomic reference counting and per-type shared locks.
//!
//! [`AtomicCount`] is the crate's only use of bare atomics outside the spin
//! lock: an integer with atomic increment/decrement, used for reference
//! counting. [`CountedPtr`] builds a minimal shared-ownership pointer on
//! top of it, and [`ClassLockable`] uses that to hand every instance
//! associated with one Rust type the same lazily-created [`Mutex`].

#![allow(unsafe_code)]

use crate::error::SyncResult;
use crate::sync::{Lockable, Mutex};
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

/// Integer with atomic increment and decrement.
///
/// Only suited for reference counting: increments use relaxed ordering,
/// decrements release, and the observer of a zero must acquire before
/// touching the counted object.
#[derive(Debug)]
pub struct AtomicCount {
    value: AtomicUsize,
}

impl AtomicCount {
    /// Creates a count at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
        }
    }

    /// Increments and returns the new value.
    pub fn increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements and returns the new value.
    ///
    /// A caller that observes zero and frees the counted object must pair
    /// this with an acquire fence first.
    pub fn decrement(&self) -> usize {
        self.value.fetch_sub(1, Ordering::Release) - 1
    }

    /// Current value; racy by nature, for diagnostics only.
    #[must_use]
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AtomicCount {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.value.load(Ordering::Relaxed),
            0,
            "reference count destroyed while non-zero"
        );
    }
}

struct Counted<T> {
    count: AtomicCount,
    value: T,
}

/// Minimal shared-ownership pointer over an [`AtomicCount`].
///
/// Clone increments; drop decrements and frees the shared allocation when
/// the count reaches zero.
pub struct CountedPtr<T> {
    shared: NonNull<Counted<T>>,
    _marker: PhantomData<Counted<T>>,
}

// SAFETY: a CountedPtr hands out only shared references to `T`; moving the
// pointer between threads is sound when `T` can be shared and sent.
unsafe impl<T: Send + Sync> Send for CountedPtr<T> {}
// SAFETY: as above.
unsafe impl<T: Send + Sync> Sync for CountedPtr<T> {}

impl<T> CountedPtr<T> {
    /// Moves `value` into a counted allocation with a count of one.
    #[must_use]
    pub fn new(value: T) -> Self {
        let counted = Counted {
            count: AtomicCount::new(),
            value,
        };
        counted.count.increment();
        Self {
            shared: NonNull::from(Box::leak(Box::new(counted))),
            _marker: PhantomData,
        }
    }

    fn shared(&self) -> &Counted<T> {
        // SAFETY: the allocation lives until the count hits zero, and this
        // handle holds one reference.
        unsafe { self.shared.as_ref() }
    }

    /// Current reference count; racy by nature, for diagnostics only.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.shared().count.get()
    }

    /// True when both pointers share one allocation.
    #[must_use]
    pub fn same_allocation(&self, other: &Self) -> bool {
        self.shared == other.shared
    }
}

impl<T> Clone for CountedPtr<T> {
    fn clone(&self) -> Self {
        self.shared().count.increment();
        Self {
            shared: self.shared,
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for CountedPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.shared().value
    }
}

impl<T> Drop for CountedPtr<T> {
    fn drop(&mut self) {
        if self.shared().count.decrement() == 0 {
            // Pair with the release decrements of the other handles before
            // the allocation is reclaimed.
            fence(Ordering::Acquire);
            // SAFETY: the count reached zero, so this was the last handle
            // and nobody else can observe the allocation.
            drop(unsafe { Box::from_raw(self.shared.as_ptr()) });
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CountedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountedPtr")
            .field("value", &**self)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Registry of the lazily-created per-type locks.
///
/// Entries live for the program's lifetime; the registry itself holds one
/// reference, and every live [`ClassLockable`] holds another.
static CLASS_LOCKS: OnceLock<std::sync::Mutex<HashMap<TypeId, CountedPtr<Mutex>>>> =
    OnceLock::new();

fn class_lock_for(type_id: TypeId) -> CountedPtr<Mutex> {
    let registry = CLASS_LOCKS.get_or_init(|| std::sync::Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    map.entry(type_id)
        .or_insert_with(|| CountedPtr::new(Mutex::new()))
        .clone()
}

/// A lock shared by every instance tied to the type `C`.
///
/// Construction clones the type's shared [`Mutex`], creating it on first
/// use. All `ClassLockable<C>` values for the same `C` serialize against
/// each other.
#[derive(Debug)]
pub struct ClassLockable<C: ?Sized + 'static> {
    lock: CountedPtr<Mutex>,
    _class: PhantomData<fn(&C)>,
}

impl<C: ?Sized + 'static> ClassLockable<C> {
    /// Binds to the shared lock of type `C`, creating it on first use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: class_lock_for(TypeId::of::<C>()),
            _class: PhantomData,
        }
    }
}

impl<C: ?Sized + 'static> Default for ClassLockable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized + 'static> Lockable for ClassLockable<C> {
    fn acquire(&self) -> SyncResult<()> {
        self.lock.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.lock.try_acquire(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.lock.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn init_test(name: &str) {
        crate::test_logging::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn count_tracks_increments_and_decrements() {
        init_test("count_tracks_increments_and_decrements");
        let count = AtomicCount::new();
        crate::assert_with_log!(count.increment() == 1, "first", 1usize, count.get());
        crate::assert_with_log!(count.increment() == 2, "second", 2usize, count.get());
        crate::assert_with_log!(count.decrement() == 1, "down to one", 1usize, count.get());
        crate::assert_with_log!(count.decrement() == 0, "down to zero", 0usize, count.get());
        crate::test_complete!("count_tracks_increments_and_decrements");
    }

    #[test]
    fn counted_ptr_shares_and_frees() {
        init_test("counted_ptr_shares_and_frees");
        let first = CountedPtr::new(String::from("shared"));
        crate::assert_with_log!(first.ref_count() == 1, "one holder", 1usize, first.ref_count());

        let second = first.clone();
        crate::assert_with_log!(
            first.same_allocation(&second),
            "same allocation",
            true,
            first.same_allocation(&second)
        );
        crate::assert_with_log!(first.ref_count() == 2, "two holders", 2usize, first.ref_count());
        crate::assert_with_log!(&*second == "shared", "value shared", "shared", &**second);

        drop(second);
        crate::assert_with_log!(
            first.ref_count() == 1,
            "back to one holder",
            1usize,
            first.ref_count()
        );
        crate::test_complete!("counted_ptr_shares_and_frees");
    }

    #[test]
    fn counted_ptr_survives_cross_thread_clone_storm() {
        init_test("counted_ptr_survives_cross_thread_clone_storm");
        let shared = CountedPtr::new(42u64);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let local = shared.clone();
                std::thread::spawn(move || {
                    let mut sum = 0;
                    for _ in 0..100 {
                        let inner = local.clone();
                        sum += *inner;
                    }
                    sum
                })
            })
            .collect();
        for handle in handles {
            let sum = handle.join().expect("thread panicked");
            crate::assert_with_log!(sum == 4200, "clones read the value", 4200u64, sum);
        }
        crate::assert_with_log!(
            shared.ref_count() == 1,
            "only the original remains",
            1usize,
            shared.ref_count()
        );
        crate::test_complete!("counted_ptr_survives_cross_thread_clone_storm");
    }

    struct AlphaTag;
    struct BetaTag;

    #[test]
    fn class_lock_is_shared_per_type() {
        init_test("class_lock_is_shared_per_type");
        let first: ClassLockable<AlphaTag> = ClassLockable::new();
        let second: ClassLockable<AlphaTag> = ClassLockable::new();
        let other: ClassLockable<BetaTag> = ClassLockable::new();

        first.acquire().expect("acquire class lock");
        // A sibling of the same class contends on the same lock...
        let second = Arc::new(second);
        let sibling = Arc::clone(&second);
        let blocked = std::thread::spawn(move || {
            !sibling
                .try_acquire(Duration::ZERO)
                .expect("try_acquire class lock")
        })
        .join()
        .expect("probe thread panicked");
        crate::assert_with_log!(blocked, "same class serializes", true, blocked);

        // ...while a different class does not.
        let other = Arc::new(other);
        let foreign = Arc::clone(&other);
        let admitted = std::thread::spawn(move || {
            let got = foreign
                .try_acquire(Duration::ZERO)
                .expect("try_acquire other class");
            if got {
                foreign.release().expect("release other class");
            }
            got
        })
        .join()
        .expect("probe thread panicked");
        crate::assert_with_log!(admitted, "different class is free", true, admitted);

        first.release().expect("release class lock");
        crate::test_complete!("class_lock_is_shared_per_type");
    }
}
