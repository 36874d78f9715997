use std::sync::Mutex;

use crate::bitmap::Bitmap;

/// Process-wide recycler for port bitmaps. The bitmaps are 8 KiB each and
/// placement paths churn through them constantly, so released ones are kept
/// around for reuse instead of being dropped.
///
/// Bitmaps come back dirty: callers must `clear_all` before first use.
pub struct BitmapPool {
    slots: Mutex<Vec<Bitmap>>,
}

impl BitmapPool {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> Option<Bitmap> {
        self.slots.lock().expect("bitmap pool mutex poisoned").pop()
    }

    pub fn put(&self, bitmap: Bitmap) {
        self.slots
            .lock()
            .expect("bitmap pool mutex poisoned")
            .push(bitmap);
    }
}

impl Default for BitmapPool {
    fn default() -> Self {
        Self::new()
    }
}

pub static PORT_BITMAP_POOL: BitmapPool = BitmapPool::new();
