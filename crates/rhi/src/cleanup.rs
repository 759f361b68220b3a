//! Release of half-built objects when a constructor bails out early.

/// Runs `release` when dropped, unless [`disarm`](Self::disarm) was called
/// first.
///
/// ```ignore
/// let cleanup = Cleanup::new(|| unsafe { device.destroy_image(image, None) });
/// bind(image)?;
/// cleanup.disarm();
/// ```
pub(crate) struct Cleanup<F: FnOnce()> {
    release: Option<F>,
}

impl<F: FnOnce()> Cleanup<F> {
    pub(crate) fn new(release: F) -> Self {
        Self {
            release: Some(release),
        }
    }

    /// Construction succeeded; ownership has moved on.
    pub(crate) fn disarm(mut self) {
        self.release = None;
    }
}

impl<F: FnOnce()> Drop for Cleanup<F> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn build(released: &Cell<u32>, fail: bool) -> Result<u32, &'static str> {
        let cleanup = Cleanup::new(|| released.set(released.get() + 1));
        if fail {
            return Err("bind failed");
        }
        cleanup.disarm();
        Ok(7)
    }

    #[test]
    fn test_release_runs_on_early_return() {
        let released = Cell::new(0);
        assert_eq!(build(&released, true), Err("bind failed"));
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn test_disarmed_cleanup_does_nothing() {
        let released = Cell::new(0);
        assert_eq!(build(&released, false), Ok(7));
        assert_eq!(released.get(), 0);
    }

    #[test]
    fn test_release_hands_back_moved_value() {
        // The pattern the constructors use: the guarded value sits in a
        // cell so the success path can take it back out.
        let slot = Cell::new(Some(String::from("allocation")));
        let freed = Cell::new(None);
        {
            let _cleanup = Cleanup::new(|| freed.set(slot.take()));
        }
        assert_eq!(freed.take().as_deref(), Some("allocation"));
        assert!(slot.take().is_none());
    }
}
