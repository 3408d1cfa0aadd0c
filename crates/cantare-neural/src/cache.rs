//! On-disk cache of rendered phrases.
//!
//! One 16-bit mono WAV per (phrase hash, depth, speedup). Concurrent requests
//! for the same file share a single render; files are written under a
//! temporary name and renamed, so a reader sees either nothing or a whole file.

use crate::{Error, Result};
use cantare_core::CancellationToken;
use cantare_export::{quantize_i16, read_wav_mono, write_wav_mono, WavConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identity of one cached render.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub prefix: String,
    pub hash: u64,
    /// Shallow-diffusion depth; `None` when the voice renders full diffusion.
    pub depth: Option<i32>,
    pub speedup: i32,
}

impl CacheKey {
    pub fn new(prefix: impl Into<String>, hash: u64, depth: Option<i32>, speedup: i32) -> Self {
        Self {
            prefix: prefix.into(),
            hash,
            depth,
            speedup,
        }
    }

    pub fn file_name(&self) -> String {
        match self.depth {
            Some(depth) => format!(
                "{}-{:016x}-depth{}-{}x.wav",
                self.prefix, self.hash, depth, self.speedup
            ),
            None => format!("{}-{:016x}-{}x.wav", self.prefix, self.hash, self.speedup),
        }
    }
}

type Shared = std::result::Result<Arc<Vec<f32>>, Arc<Error>>;

#[derive(Default)]
struct Flight {
    done: Mutex<Option<Shared>>,
    cond: Condvar,
}

impl Flight {
    fn wait(&self) -> Shared {
        let mut done = self.done.lock();
        loop {
            if let Some(result) = done.as_ref() {
                return result.clone();
            }
            self.cond.wait(&mut done);
        }
    }

    fn finish(&self, result: Shared) {
        *self.done.lock() = Some(result);
        self.cond.notify_all();
    }
}

/// Removes the flight on every exit path of the leader, including unwinding.
struct Leader<'a> {
    cache: &'a RenderCache,
    path: PathBuf,
    flight: Arc<Flight>,
    finished: bool,
}

impl Leader<'_> {
    fn finish(mut self, result: Shared) {
        self.flight.finish(result);
        self.finished = true;
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.flight
                .finish(Err(Arc::new(Error::Inference("render abandoned".into()))));
        }
        self.cache.flights.lock().remove(&self.path);
    }
}

enum Slot {
    Lead(Arc<Flight>),
    Join(Arc<Flight>),
}

pub struct RenderCache {
    dir: PathBuf,
    enabled: AtomicBool,
    flights: Mutex<HashMap<PathBuf, Arc<Flight>>>,
}

impl RenderCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled: AtomicBool::new(enabled),
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Cached samples for `key`, rendering and storing them on a miss.
    ///
    /// Samples are quantized to 16 bits on both paths, so a hit returns the
    /// same values as the miss that produced it. A request that joined a
    /// render cancelled by someone else retries with its own `render` unless
    /// its own token is cancelled too.
    pub fn get_or_render<F>(
        &self,
        key: &CacheKey,
        sample_rate: u32,
        cancellation: &CancellationToken,
        render: F,
    ) -> Result<Vec<f32>>
    where
        F: FnOnce() -> Result<Vec<f32>>,
    {
        if !self.is_enabled() {
            return Ok(quantize_i16(&render()?));
        }

        let path = self.path_for(key);
        let mut render = Some(render);
        loop {
            if let Some(samples) = self.read(&path, sample_rate) {
                return Ok(samples);
            }

            let slot = {
                let mut flights = self.flights.lock();
                match flights.get(&path) {
                    Some(flight) => Slot::Join(flight.clone()),
                    None => {
                        let flight = Arc::new(Flight::default());
                        flights.insert(path.clone(), flight.clone());
                        Slot::Lead(flight)
                    }
                }
            };

            match slot {
                Slot::Join(flight) => match flight.wait() {
                    Ok(samples) => return Ok(samples.as_ref().clone()),
                    Err(e) if e.is_cancelled() && !cancellation.is_cancelled() => {
                        tracing::debug!(file = %path.display(), "joined render was cancelled, retrying");
                    }
                    Err(e) => return Err(Error::Joined(e)),
                },
                Slot::Lead(flight) => {
                    let leader = Leader {
                        cache: self,
                        path: path.clone(),
                        flight,
                        finished: false,
                    };
                    // Another leader may have stored the file between the read and the lock.
                    if let Some(samples) = self.read(&path, sample_rate) {
                        leader.finish(Ok(Arc::new(samples.clone())));
                        return Ok(samples);
                    }
                    let Some(render) = render.take() else {
                        return Err(Error::Inference("render closure already consumed".into()));
                    };
                    return match render() {
                        Ok(samples) => {
                            let samples = quantize_i16(&samples);
                            self.store(&path, &samples, sample_rate);
                            let shared = Arc::new(samples);
                            leader.finish(Ok(shared.clone()));
                            Ok(Arc::try_unwrap(shared).unwrap_or_else(|s| s.as_ref().clone()))
                        }
                        Err(e) => {
                            let shared = Arc::new(e);
                            leader.finish(Err(shared.clone()));
                            Err(Arc::try_unwrap(shared).unwrap_or_else(Error::Joined))
                        }
                    };
                }
            }
        }
    }

    fn read(&self, path: &Path, sample_rate: u32) -> Option<Vec<f32>> {
        if !path.is_file() {
            return None;
        }
        match read_wav_mono(path) {
            Ok((samples, rate)) if rate == sample_rate => {
                tracing::debug!(file = %path.display(), "cache hit");
                Some(samples)
            }
            Ok((_, rate)) => {
                tracing::warn!(file = %path.display(), rate, expected = sample_rate, "cached file has wrong sample rate, rendering again");
                None
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "unreadable cache file, rendering again");
                None
            }
        }
    }

    fn store(&self, path: &Path, samples: &[f32], sample_rate: u32) {
        let written = std::fs::create_dir_all(&self.dir)
            .map_err(Error::from)
            .and_then(|_| Ok(write_wav_mono(path, samples, &WavConfig::pcm16(sample_rate))?));
        match written {
            Ok(()) => tracing::debug!(file = %path.display(), samples = samples.len(), "cached render"),
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "failed to write cache file"),
        }
    }

    /// Delete every cached WAV file. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "wav") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!(dir = %self.dir.display(), removed, "cleared render cache");
        Ok(removed)
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("dir", &self.dir)
            .field("enabled", &self.is_enabled())
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}
