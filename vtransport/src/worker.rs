//! Decode worker thread on the receiver.
//!
//! The network thread appends complete frames to a shared queue; the
//! worker drains that queue into a private one under the lock, then
//! decodes and displays without holding it. Frames arrive in strictly
//! increasing id order and are processed in that order.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info};

use crate::codec::VideoDecoder;
use crate::error::Result;
use crate::reassembly::{Frame, MAX_DECODING_BUF};
use crate::stats::StatsFile;
use crate::time::timestamp_us;
use crate::video::VideoDisplay;

/// Constructs the decoder context and the optional display surface.
///
/// Runs inside the worker thread, so neither needs to cross threads after
/// construction.
pub type WorkerInit =
    Box<dyn FnOnce() -> Result<(Box<dyn VideoDecoder>, Option<Box<dyn VideoDisplay>>)> + Send>;

#[derive(Default)]
struct SharedQueue {
    frames: VecDeque<Frame>,
    should_exit: bool,
}

struct Shared {
    queue: Mutex<SharedQueue>,
    cv: Condvar,
}

/// Handle to the decode worker. Dropping it signals the exit flag and
/// joins the thread; the worker finishes the frames it already received.
pub struct DecodeWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(init: WorkerInit, output: Option<StatsFile>) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(SharedQueue::default()),
            cv: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("decode-worker".into())
            .spawn(move || {
                if let Err(e) = worker_main(&worker_shared, init, output) {
                    error!("decode worker terminated: {e}");
                }
            })?;
        info!("Spawned a new thread for decoding and displaying frames");

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Appends a complete frame to the shared queue and wakes the worker.
    pub fn push(&self, frame: Frame) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.frames.push_back(frame);
        self.shared.cv.notify_one();
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.should_exit = true;
        }
        self.shared.cv.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_main(shared: &Shared, init: WorkerInit, mut output: Option<StatsFile>) -> Result<()> {
    let (mut decoder, mut display) = init()?;

    let mut local_queue: VecDeque<Frame> = VecDeque::new();
    let mut decode_buf: Vec<u8> = Vec::with_capacity(MAX_DECODING_BUF);

    let mut num_decoded_frames = 0u32;
    let mut total_decode_time_ms = 0.0f64;
    let mut max_decode_time_ms = 0.0f64;
    let mut last_stats_time = Instant::now();

    loop {
        // Drop the display once it has been signalled to quit.
        if display.as_mut().is_some_and(|d| d.signal_quit()) {
            display = None;
        }

        let exiting;
        {
            let mut queue = shared.queue.lock().unwrap();
            while queue.frames.is_empty() && !queue.should_exit {
                queue = shared.cv.wait(queue).unwrap();
            }
            // Move the shared queue quickly and release the lock before
            // decoding anything.
            local_queue.append(&mut queue.frames);
            exiting = queue.should_exit;
        }

        while let Some(frame) = local_queue.pop_front() {
            let frame_id = frame.id();
            let frame_size = frame.copy_into(&mut decode_buf)?;

            let decode_start = Instant::now();
            let decoded = decoder.decode(&decode_buf)?;
            let decode_time_ms = decode_start.elapsed().as_secs_f64() * 1000.0;

            if let Some(out) = output.as_mut() {
                out.receiver_record(frame_id, frame_size, timestamp_us())?;
            }

            if let (Some(d), Some(image)) = (display.as_mut(), decoded.as_ref()) {
                d.show_frame(image)?;
            }

            num_decoded_frames += 1;
            total_decode_time_ms += decode_time_ms;
            max_decode_time_ms = max_decode_time_ms.max(decode_time_ms);

            let stats_now = Instant::now();
            while stats_now >= last_stats_time + Duration::from_secs(1) {
                if num_decoded_frames > 0 {
                    info!(
                        "[worker] Avg/Max decoding time (ms) of {} frames: {:.2}/{:.2}",
                        num_decoded_frames,
                        total_decode_time_ms / f64::from(num_decoded_frames),
                        max_decode_time_ms
                    );
                }
                num_decoded_frames = 0;
                total_decode_time_ms = 0.0;
                max_decode_time_ms = 0.0;
                last_stats_time += Duration::from_secs(1);
            }
        }

        if exiting {
            return Ok(());
        }
    }
}
