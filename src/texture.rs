//! Thumbnail textures: background decode + GPU-resident LRU cache.
//!
//! Flow:
//!   1. Preloader::schedule_blob(key, webp) → worker thread decodes to RGBA
//!   2. main thread: Preloader::try_take(key) → TextureCache::upload(key, img)
//!   3. TextureCache::get(key) → GL texture id for drawing
//!
//! Background threads only do CPU work (image decode). GL uploads happen on
//! the main thread. Texture ids double as imgui texture ids (the glow
//! renderer maps them 1:1).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;

use image::GenericImageView;

/// Decoded image: raw RGBA pixels ready for GL upload.
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    /// Decode an image file to RGBA. Returns None on failure.
    #[allow(dead_code)]
    pub fn from_file(path: &str) -> Option<Self> {
        let img = image::open(path).ok()?;
        Some(Self::from_dynamic(img))
    }

    /// Decode an in-memory image (a thumbnail blob) to RGBA.
    pub fn from_memory(data: &[u8]) -> Option<Self> {
        let img = image::load_from_memory(data).ok()?;
        Some(Self::from_dynamic(img))
    }

    fn from_dynamic(img: image::DynamicImage) -> Self {
        let (w, h) = img.dimensions();
        DecodedImage {
            rgba: img.into_rgba8().into_raw(),
            width: w,
            height: h,
        }
    }
}

/// Info about a cached GL texture.
#[derive(Clone, Copy)]
pub struct TexInfo {
    pub gl_id: u32,
    pub width: u32,
    pub height: u32,
}

/// LRU texture cache — keeps up to `capacity` GL textures on the GPU.
pub struct TextureCache {
    capacity: usize,
    /// key (thumb fingerprint) → TexInfo
    map: HashMap<String, TexInfo>,
    /// LRU order: front = oldest, back = newest
    order: VecDeque<String>,
}

impl TextureCache {
    pub fn new(capacity: usize) -> Self {
        TextureCache {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<TexInfo> {
        self.map.get(key).copied()
    }

    /// Upload a decoded image to a GL texture and cache it.
    pub fn upload(&mut self, key: &str, img: DecodedImage) {
        if self.map.contains_key(key) {
            self.touch(key);
            return;
        }

        while self.map.len() >= self.capacity {
            if let Some(old_key) = self.order.pop_front() {
                if let Some(info) = self.map.remove(&old_key) {
                    unsafe {
                        gl::DeleteTextures(1, &info.gl_id);
                    }
                }
            }
        }

        let gl_id = unsafe {
            let mut tex = 0u32;
            gl::GenTextures(1, &mut tex);
            gl::BindTexture(gl::TEXTURE_2D, tex);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as i32,
                img.width as i32,
                img.height as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                img.rgba.as_ptr() as *const _,
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
            tex
        };

        self.map.insert(
            key.to_string(),
            TexInfo {
                gl_id,
                width: img.width,
                height: img.height,
            },
        );
        self.order.push_back(key.to_string());
    }

    /// Move a key to the back of the LRU (most recently used).
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        for info in self.map.values() {
            unsafe {
                gl::DeleteTextures(1, &info.gl_id);
            }
        }
    }
}

/// Background preloader — decodes images on worker threads.
pub struct Preloader {
    /// Keys currently being decoded or already decoded (not yet taken).
    pending: Arc<Mutex<HashSet<String>>>,
    /// Decoded images waiting to be taken.
    ready: Arc<Mutex<HashMap<String, DecodedImage>>>,
}

impl Preloader {
    pub fn new() -> Self {
        Preloader {
            pending: Arc::new(Mutex::new(HashSet::new())),
            ready: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().unwrap().contains(key)
    }

    /// Try to take a decoded image (removes it from the ready map).
    pub fn try_take(&self, key: &str) -> Option<DecodedImage> {
        let mut ready = self.ready.lock().unwrap();
        let img = ready.remove(key);
        if img.is_some() {
            self.pending.lock().unwrap().remove(key);
        }
        img
    }

    /// Schedule background decode of an in-memory blob under `key`.
    pub fn schedule_blob(&self, key: String, data: Vec<u8>) {
        self.schedule(key, move || DecodedImage::from_memory(&data));
    }

    /// Schedule background decode of an image file (key = path).
    #[allow(dead_code)]
    pub fn schedule_file(&self, path: String) {
        let p = path.clone();
        self.schedule(path, move || DecodedImage::from_file(&p));
    }

    fn schedule<F>(&self, key: String, decode: F)
    where
        F: FnOnce() -> Option<DecodedImage> + Send + 'static,
    {
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains(&key) {
                return;
            }
            pending.insert(key.clone());
        }

        let pending = self.pending.clone();
        let ready = self.ready.clone();

        thread::spawn(move || {
            if let Some(img) = decode() {
                ready.lock().unwrap().insert(key, img);
            } else {
                // Failed — drop the reservation so callers stop waiting
                pending.lock().unwrap().remove(&key);
            }
        });
    }
}
