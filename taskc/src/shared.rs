use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

/// A convenience type alias for [Arc<RwLock<T>>].
///
/// # Example
///
/// ```
/// use parking_lot::RwLock;
/// use taskc::shared::Shared;
///
/// let lock: Shared<i32> = Shared::new(RwLock::new(42));
/// assert_eq!(*lock.read(), 42);
/// ```
/// can also be used together with [SharedExt].
pub type Shared<T> = Arc<RwLock<T>>;

/// A convenience trait around [RwLock].
///
/// The translation unit's global scope and the driver's result collector are
/// both shared through this type. Lowering of a single translation unit is
/// single-threaded, so a lock that cannot be taken immediately means the same
/// thread already holds it. `parking_lot`'s deadlock detection reports that
/// case in debug builds.
///
/// # Example
///
/// ```
/// use parking_lot::RwLock;
/// use std::sync::Arc;
/// use taskc::shared::SharedExt;
///
/// let lock = Arc::new(RwLock::new(42));
/// assert_eq!(*lock.rd(), 42);
/// *lock.wr() = 43;
/// assert_eq!(*lock.rd(), 43);
/// ```
pub trait SharedExt<T: ?Sized> {
    /// Convenience method for reading.
    fn rd(&self) -> RwLockReadGuard<'_, T>;
    /// Convenience method for writing.
    fn wr(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T: ?Sized> SharedExt<T> for Shared<T> {
    fn rd(&self) -> RwLockReadGuard<'_, T> {
        self.read()
    }
    fn wr(&self) -> RwLockWriteGuard<'_, T> {
        self.write()
    }
}

#[test]
fn test_shared() {
    let lock: Shared<i32> = Shared::new(RwLock::new(42));
    assert_eq!(*lock.rd(), 42);
    *lock.wr() = 7;
    assert_eq!(*lock.rd(), 7);
}
