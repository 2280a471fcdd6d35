/// A read-only view of one analysis window.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisWindow<'a> {
    /// Absolute index of the window's first sample in the stream.
    pub start: u64,
    pub samples: &'a [f32],
}

/// Accumulates a mono sample stream into overlapping fixed-size windows.
///
/// Samples land in a fixed-capacity ring. A window becomes available once
/// `frame_size` samples have arrived past the current window start, after
/// which the start advances by `hop_size`. When the producer outruns the
/// consumer the oldest hop is dropped and counted, the push never fails.
pub struct FrameBuffer {
    ring: Box<[f32]>,
    window: Box<[f32]>,
    frame_size: usize,
    hop_size: usize,
    // Total samples ever pushed.
    written: u64,
    // Absolute index of the next window start.
    cursor: u64,
    overruns: u64,
    dropped_samples: u64,
}

impl FrameBuffer {
    pub fn new(frame_size: usize, hop_size: usize, capacity: usize) -> Self {
        assert!(frame_size > 0, "frame size must be greater than 0");
        assert!(hop_size > 0, "hop size must be greater than 0");
        assert!(hop_size <= frame_size, "hop size must not exceed frame size");
        assert!(capacity >= frame_size, "ring capacity must hold a full frame");
        Self {
            ring: vec![0.0; capacity].into_boxed_slice(),
            window: vec![0.0; frame_size].into_boxed_slice(),
            frame_size,
            hop_size,
            written: 0,
            cursor: 0,
            overruns: 0,
            dropped_samples: 0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        let capacity = self.ring.len() as u64;
        if self.written - self.cursor == capacity {
            self.cursor += self.hop_size as u64;
            self.overruns += 1;
            self.dropped_samples += self.hop_size as u64;
            log::debug!(
                "Frame buffer overrun at sample {} ({} total)",
                self.written,
                self.overruns
            );
        }
        let slot = (self.written % capacity) as usize;
        self.ring[slot] = sample;
        self.written += 1;
    }

    pub fn push_slice(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Samples available from the current window start onwards.
    pub fn pending(&self) -> usize {
        (self.written - self.cursor) as usize
    }

    /// Returns the next window, or `None` when fewer than `frame_size`
    /// samples are available yet.
    pub fn try_take_window(&mut self) -> Option<AnalysisWindow<'_>> {
        if self.pending() < self.frame_size {
            return None;
        }

        let capacity = self.ring.len();
        let begin = (self.cursor % capacity as u64) as usize;
        let first = (capacity - begin).min(self.frame_size);
        self.window[..first].copy_from_slice(&self.ring[begin..begin + first]);
        self.window[first..].copy_from_slice(&self.ring[..self.frame_size - first]);

        let start = self.cursor;
        self.cursor += self.hop_size as u64;
        Some(AnalysisWindow {
            start,
            samples: &self.window,
        })
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }
}

/// Start offsets of every window a `FrameBuffer` emits for a stream of
/// `len` samples, assuming the consumer keeps up.
pub fn window_starts(len: usize, frame_size: usize, hop_size: usize) -> impl Iterator<Item = usize> {
    (0..)
        .map(move |i: usize| i * hop_size)
        .take_while(move |&start| start + frame_size <= len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn not_ready_until_full_frame() {
        let mut buffer = FrameBuffer::new(8, 4, 32);
        buffer.push_slice(&ramp(7));
        assert!(buffer.try_take_window().is_none());
        buffer.push(7.0);
        let window = buffer.try_take_window().unwrap();
        assert_eq!(window.start, 0);
        assert_eq!(window.samples, &ramp(8)[..]);
        assert!(buffer.try_take_window().is_none());
    }

    #[test]
    fn consecutive_windows_overlap_by_frame_minus_hop() {
        let frame = 2048;
        let hop = 512;
        let mut buffer = FrameBuffer::new(frame, hop, 4 * frame);
        let mut previous: Option<(u64, Vec<f32>)> = None;
        let mut count = 0;

        for chunk in ramp(20_000).chunks(300) {
            buffer.push_slice(chunk);
            while let Some(window) = buffer.try_take_window() {
                if let Some((prev_start, prev)) = &previous {
                    assert_eq!(window.start, prev_start + hop as u64);
                    assert_eq!(&window.samples[..frame - hop], &prev[hop..]);
                }
                previous = Some((window.start, window.samples.to_vec()));
                count += 1;
            }
        }

        assert_eq!(count, window_starts(20_000, frame, hop).count());
        assert_eq!(buffer.overruns(), 0);
    }

    #[test]
    fn windows_survive_ring_wraparound() {
        let mut buffer = FrameBuffer::new(6, 2, 7);
        let signal = ramp(40);
        let mut starts = Vec::new();
        for &s in &signal {
            buffer.push(s);
            if let Some(window) = buffer.try_take_window() {
                let start = window.start as usize;
                assert_eq!(window.samples, &signal[start..start + 6]);
                starts.push(start);
            }
        }
        assert_eq!(starts, window_starts(40, 6, 2).collect::<Vec<_>>());
    }

    #[test]
    fn overrun_drops_oldest_hop_and_counts() {
        let mut buffer = FrameBuffer::new(4, 2, 8);
        buffer.push_slice(&ramp(8));
        assert_eq!(buffer.overruns(), 0);

        buffer.push(8.0);
        assert_eq!(buffer.overruns(), 1);
        assert_eq!(buffer.dropped_samples(), 2);

        let window = buffer.try_take_window().unwrap();
        assert_eq!(window.start, 2);
        assert_eq!(window.samples, &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn window_starts_for_short_stream_is_empty() {
        assert_eq!(window_starts(100, 2048, 512).count(), 0);
        assert_eq!(window_starts(2048, 2048, 512).collect::<Vec<_>>(), vec![0]);
        assert_eq!(window_starts(3072, 2048, 512).collect::<Vec<_>>(), vec![0, 512, 1024]);
    }
}
