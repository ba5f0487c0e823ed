//! Asynchronous tile fetching.
//!
//! A [`TileFetcher`] never blocks the caller: requests are queued and completed
//! responses are drained later with [`TileFetcher::poll`], from the same
//! single-threaded loop that owns the renderer. Completion order is arbitrary.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::cache::TileImage;
use super::{TileDescriptor, TileRequest};
use crate::error::TileError;

/// A completed fetch, successful or not.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub tile: TileDescriptor,
    pub result: Result<TileImage, TileError>,
}

/// Non-blocking tile transport.
pub trait TileFetcher {
    /// Queue a fetch. Must return immediately.
    fn request(&mut self, request: TileRequest);

    /// The tile left the view. Implementations may skip it if not yet started;
    /// a response that arrives anyway is still valid.
    fn cancel(&mut self, _tile: TileDescriptor) {}

    /// Drain completed responses.
    fn poll(&mut self) -> Vec<TileResponse>;

    /// Requests issued but not yet returned by `poll`.
    fn pending(&self) -> usize;
}

/// Blocking loader run on a worker thread: returns the encoded tile bytes.
pub type TileLoader = Arc<dyn Fn(&TileRequest) -> Result<Vec<u8>, String> + Send + Sync>;

/// Decode an encoded tile into RGBA, rejecting rasters larger than the tile size.
pub fn decode_tile(tile: TileDescriptor, bytes: &[u8], tile_size: u32) -> Result<TileImage, TileError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| TileError::decode(tile, e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width > tile_size || height > tile_size {
        return Err(TileError::Oversized {
            tile,
            width,
            height,
            tile_size,
        });
    }
    Ok(TileImage::new(width, height, rgba.into_raw()))
}

/// Message sent to the worker threads.
enum WorkerMessage {
    Fetch(TileRequest),
    Shutdown,
}

/// Fetches tiles on a small pool of background threads.
///
/// Each worker runs the loader, decodes the bytes and sends the result back over a
/// channel that [`TileFetcher::poll`] drains without blocking.
pub struct ThreadedFetcher {
    request_tx: Sender<WorkerMessage>,
    result_rx: Receiver<TileResponse>,
    workers: Vec<JoinHandle<()>>,
    /// Tiles requested and not yet polled
    pending: HashSet<TileDescriptor>,
    /// Tiles the workers should skip if they have not started them
    cancelled: Arc<Mutex<HashSet<TileDescriptor>>>,
}

impl ThreadedFetcher {
    /// Spawn `workers` threads (at least one) running `loader`.
    pub fn spawn(loader: TileLoader, tile_size: u32, workers: usize) -> Result<Self, String> {
        let (request_tx, request_rx) = mpsc::channel::<WorkerMessage>();
        let (result_tx, result_rx) = mpsc::channel::<TileResponse>();
        let request_rx = Arc::new(Mutex::new(request_rx));
        let cancelled = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for index in 0..workers.max(1) {
            let request_rx = Arc::clone(&request_rx);
            let result_tx = result_tx.clone();
            let cancelled = Arc::clone(&cancelled);
            let loader = Arc::clone(&loader);
            let handle = thread::Builder::new()
                .name(format!("tile-fetch-{index}"))
                .spawn(move || {
                    log::debug!("Tile fetch worker {} started", index);
                    Self::worker_loop(&request_rx, &result_tx, &cancelled, loader.as_ref(), tile_size);
                    log::debug!("Tile fetch worker {} exiting", index);
                })
                .map_err(|e| format!("Failed to spawn tile fetch worker: {}", e))?;
            handles.push(handle);
        }

        log::info!("Spawned {} tile fetch workers", handles.len());

        Ok(Self {
            request_tx,
            result_rx,
            workers: handles,
            pending: HashSet::new(),
            cancelled,
        })
    }

    fn worker_loop(
        request_rx: &Mutex<Receiver<WorkerMessage>>,
        result_tx: &Sender<TileResponse>,
        cancelled: &Mutex<HashSet<TileDescriptor>>,
        loader: &(dyn Fn(&TileRequest) -> Result<Vec<u8>, String> + Send + Sync),
        tile_size: u32,
    ) {
        loop {
            let message = match request_rx.lock() {
                Ok(rx) => rx.recv(),
                Err(_) => break,
            };
            let request = match message {
                Ok(WorkerMessage::Fetch(request)) => request,
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            };

            let skip = cancelled
                .lock()
                .map(|mut set| set.remove(&request.tile))
                .unwrap_or(false);
            if skip {
                log::trace!("Skipping cancelled tile {}", request.tile);
                continue;
            }

            let tile = request.tile;
            let result = loader(&request)
                .map_err(|message| TileError::transport(tile, message))
                .and_then(|bytes| decode_tile(tile, &bytes, tile_size));
            if result_tx.send(TileResponse { tile, result }).is_err() {
                log::warn!("Result channel closed, tile fetch worker exiting");
                break;
            }
        }
    }
}

impl TileFetcher for ThreadedFetcher {
    fn request(&mut self, request: TileRequest) {
        let tile = request.tile;
        if let Ok(mut set) = self.cancelled.lock() {
            set.remove(&tile);
        }
        if self.request_tx.send(WorkerMessage::Fetch(request)).is_err() {
            log::error!("Failed to send tile request {}: workers gone", tile);
            return;
        }
        self.pending.insert(tile);
    }

    fn cancel(&mut self, tile: TileDescriptor) {
        if self.pending.remove(&tile)
            && let Ok(mut set) = self.cancelled.lock()
        {
            set.insert(tile);
        }
    }

    fn poll(&mut self) -> Vec<TileResponse> {
        let mut responses = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(response) => {
                    self.pending.remove(&response.tile);
                    responses.push(response);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Tile fetch workers disconnected");
                    break;
                }
            }
        }
        responses
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ThreadedFetcher {
    fn drop(&mut self) {
        log::debug!("Shutting down tile fetch workers");
        for _ in &self.workers {
            let _ = self.request_tx.send(WorkerMessage::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                log::warn!("Tile fetch worker panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;
    use crate::pyramid::LevelRect;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn request(col: u32) -> TileRequest {
        TileRequest {
            tile: TileDescriptor::new(1, col, 0),
            url: format!("tile/{col}"),
            level_rect: LevelRect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            image_rect: Rect::new(0.0, 0.0, 4.0, 4.0),
        }
    }

    fn wait_for(fetcher: &mut ThreadedFetcher, count: usize) -> Vec<TileResponse> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut all = Vec::new();
        while all.len() < count && Instant::now() < deadline {
            all.extend(fetcher.poll());
            std::thread::sleep(Duration::from_millis(5));
        }
        all
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let tile = TileDescriptor::new(0, 0, 0);
        let ok = decode_tile(tile, &png_bytes(4, 3), 4).unwrap();
        assert_eq!((ok.width, ok.height), (4, 3));
        assert_eq!(ok.pixels.len(), 4 * 3 * 4);
        assert!(matches!(
            decode_tile(tile, &png_bytes(5, 3), 4),
            Err(TileError::Oversized { width: 5, .. })
        ));
        assert!(matches!(
            decode_tile(tile, b"not an image", 4),
            Err(TileError::Decode { .. })
        ));
    }

    #[test]
    fn test_threaded_fetcher_delivers_success_and_failure() {
        let bytes = png_bytes(4, 4);
        let loader: TileLoader = Arc::new(move |req: &TileRequest| {
            if req.tile.col == 1 {
                Err("404".to_string())
            } else {
                Ok(bytes.clone())
            }
        });
        let mut fetcher = ThreadedFetcher::spawn(loader, 4, 2).unwrap();
        fetcher.request(request(0));
        fetcher.request(request(1));
        assert_eq!(fetcher.pending(), 2);

        let responses = wait_for(&mut fetcher, 2);
        assert_eq!(responses.len(), 2);
        assert_eq!(fetcher.pending(), 0);
        for response in responses {
            match response.tile.col {
                0 => assert!(response.result.is_ok()),
                _ => assert!(matches!(response.result, Err(TileError::Transport { .. }))),
            }
        }
    }

    #[test]
    fn test_cancel_clears_pending() {
        let bytes = png_bytes(4, 4);
        let loader: TileLoader = Arc::new(move |_req: &TileRequest| Ok(bytes.clone()));
        let mut fetcher = ThreadedFetcher::spawn(loader, 4, 1).unwrap();
        fetcher.request(request(0));
        fetcher.cancel(TileDescriptor::new(1, 0, 0));
        assert_eq!(fetcher.pending(), 0);
        // Whether or not the worker had started, a late response is still well-formed
        for response in wait_for(&mut fetcher, 1) {
            assert!(response.result.is_ok());
        }
    }
}
