// Frame scheduler - the per-frame protocol
//
// FRAME TIMELINE (slot = frame_count % N):
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait fence ─> acquire ─> reset fence ─> record ─> uniforms          │
// │      ─> submit ─> present ─> advance ─> (recreate swapchain?)        │
// └──────────────────────────────────────────────────────────────────────┘
//
// The device work is behind FrameBackend so the ordering rules live in one
// place: a slot's fence is only reset once an image has been acquired, and
// the swapchain is only rebuilt on out-of-date, suboptimal or resize.

use anyhow::Result;
use ash::vk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::swapchain::{AcquireOutcome, PresentOutcome};

/// Device operations the scheduler drives, one call per protocol step
pub trait FrameBackend {
    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn reset_fence(&mut self, slot: usize) -> Result<()>;
    /// Re-record the slot's command buffer to draw into `image_index`
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn update_uniforms(&mut self, slot: usize) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;
    /// Current drawable size of the window in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
    /// Idle the device, then tear down and rebuild the swapchain set
    fn recreate_swapchain(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image presented, swapchain untouched
    Presented,
    /// Image presented, then the swapchain was rebuilt
    Recreated,
    /// Acquire was out of date; swapchain rebuilt, nothing drawn
    Skipped,
    /// Framebuffer has zero area; nothing drawn, rebuild still pending
    Minimized,
}

impl FrameOutcome {
    pub fn presented(self) -> bool {
        matches!(self, FrameOutcome::Presented | FrameOutcome::Recreated)
    }
}

pub struct FrameScheduler {
    frames_in_flight: usize,
    frame_count: u64,
    /// Set from the window callback, consumed once per frame
    resize_requested: Arc<AtomicBool>,
    /// Recreation deferred until the framebuffer has a nonzero size
    recreate_pending: bool,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            frame_count: 0,
            resize_requested: Arc::new(AtomicBool::new(false)),
            recreate_pending: false,
        }
    }

    /// Handle for the window system to flag a resize
    pub fn resize_flag(&self) -> Arc<AtomicBool> {
        self.resize_requested.clone()
    }

    pub fn current_slot(&self) -> usize {
        (self.frame_count % self.frames_in_flight as u64) as usize
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_waiting_for_size(&self) -> bool {
        self.recreate_pending
    }

    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        if self.recreate_pending && !self.try_recreate(backend)? {
            return Ok(FrameOutcome::Minimized);
        }

        let slot = self.current_slot();
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire(slot)? {
            AcquireOutcome::Ready { image_index, .. } => image_index,
            AcquireOutcome::OutOfDate => {
                // Fence stays signaled so the next wait on this slot returns
                log::debug!("Acquire out of date, rebuilding swapchain");
                return Ok(if self.try_recreate(backend)? {
                    FrameOutcome::Skipped
                } else {
                    FrameOutcome::Minimized
                });
            }
        };

        backend.reset_fence(slot)?;
        backend.record(slot, image_index)?;
        backend.update_uniforms(slot)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        self.frame_count += 1;

        let resized = self.resize_requested.swap(false, Ordering::AcqRel);
        if presented.needs_recreate() || resized {
            log::debug!("Rebuilding swapchain (present: {:?}, resized: {})", presented, resized);
            return Ok(if self.try_recreate(backend)? {
                FrameOutcome::Recreated
            } else {
                FrameOutcome::Minimized
            });
        }

        Ok(FrameOutcome::Presented)
    }

    /// Rebuild now, or park the request while the window has no area
    fn try_recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool> {
        let extent = backend.framebuffer_extent();
        if extent.width == 0 || extent.height == 0 {
            if !self.recreate_pending {
                log::info!("Window minimized, swapchain rebuild deferred");
            }
            self.recreate_pending = true;
            return Ok(false);
        }

        // Any resize reported meanwhile is covered by this rebuild
        self.resize_requested.store(false, Ordering::Release);
        backend.recreate_swapchain()?;
        self.recreate_pending = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fence {
        Signaled,
        Reset,
        InFlight,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Uniforms(usize),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Instrumented backend: fences complete only when waited on, so any
    /// record over an unsignaled slot or wait on a never-submitted reset
    /// fence shows up as a panic.
    struct MockBackend {
        fences: Vec<Fence>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        extent: vk::Extent2D,
        image_count: u32,
        next_image: u32,
        max_in_flight: usize,
        calls: Vec<Call>,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self {
                fences: vec![Fence::Signaled; slots],
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                image_count: 3,
                next_image: 0,
                max_in_flight: 0,
                calls: Vec::new(),
            }
        }

        fn recreations(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Recreate).count()
        }

        fn in_flight(&self) -> usize {
            self.fences.iter().filter(|f| **f == Fence::InFlight).count()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            match self.fences[slot] {
                Fence::Reset => panic!("waiting on reset fence {} would never return", slot),
                _ => self.fences[slot] = Fence::Signaled,
            }
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or_else(|| {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count;
                AcquireOutcome::Ready {
                    image_index,
                    suboptimal: false,
                }
            }))
        }

        fn reset_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Reset(slot));
            assert_eq!(self.fences[slot], Fence::Signaled, "reset before completion");
            self.fences[slot] = Fence::Reset;
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.calls.push(Call::Record(slot, image_index));
            assert_eq!(self.fences[slot], Fence::Reset, "recording over in-flight slot");
            Ok(())
        }

        fn update_uniforms(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Uniforms(slot));
            assert_ne!(self.fences[slot], Fence::InFlight);
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Submit(slot));
            self.fences[slot] = Fence::InFlight;
            self.max_in_flight = self.max_in_flight.max(self.in_flight());
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn framebuffer_extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn recreate_swapchain(&mut self) -> Result<()> {
            assert!(self.extent.width > 0 && self.extent.height > 0);
            self.calls.push(Call::Recreate);
            // Device idle: everything in flight has completed
            for fence in &mut self.fences {
                if *fence == Fence::InFlight {
                    *fence = Fence::Signaled;
                }
            }
            self.next_image = 0;
            Ok(())
        }
    }

    #[test]
    fn steady_state_follows_protocol_order() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Uniforms(0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(scheduler.current_slot(), 1);
    }

    #[test]
    fn never_more_than_n_in_flight() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);

        for _ in 0..50 {
            scheduler.draw_frame(&mut backend).unwrap();
        }

        assert_eq!(scheduler.frame_count(), 50);
        assert_eq!(backend.max_in_flight, 2);
        assert_eq!(backend.recreations(), 0);
    }

    #[test]
    fn slots_alternate() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);

        for _ in 0..4 {
            scheduler.draw_frame(&mut backend).unwrap();
        }

        let submitted: Vec<usize> = backend
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec![0, 1, 0, 1]);
    }

    #[test]
    fn out_of_date_acquire_skips_without_reset() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::OutOfDate);

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(
            backend.calls,
            vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
        );
        assert_eq!(scheduler.frame_count(), 0);

        // Same slot again; its fence must still be waitable
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.recreations(), 1);
    }

    #[test]
    fn suboptimal_acquire_still_draws() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(AcquireOutcome::Ready {
            image_index: 2,
            suboptimal: true,
        });

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert!(backend.calls.contains(&Call::Present(0, 2)));
        assert_eq!(backend.recreations(), 0);
    }

    #[test]
    fn stale_present_triggers_one_rebuild() {
        for stale in [PresentOutcome::Suboptimal, PresentOutcome::OutOfDate] {
            let mut scheduler = FrameScheduler::new(2);
            let mut backend = MockBackend::new(2);
            backend.presents.push_back(stale);

            assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
            assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
            assert_eq!(backend.recreations(), 1);
            assert_eq!(scheduler.frame_count(), 2);
        }
    }

    #[test]
    fn resize_flag_is_consumed_once() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);
        let flag = scheduler.resize_flag();

        // Several notifications between frames collapse into one rebuild
        flag.store(true, Ordering::Release);
        flag.store(true, Ordering::Release);

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Recreated);
        assert!(!flag.load(Ordering::Acquire));
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.recreations(), 1);
    }

    #[test]
    fn minimized_window_defers_until_sized() {
        let mut scheduler = FrameScheduler::new(2);
        let mut backend = MockBackend::new(2);

        scheduler.draw_frame(&mut backend).unwrap();

        // Minimize: the flag fires but there is nothing to build
        backend.extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        scheduler.resize_flag().store(true, Ordering::Release);
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Minimized);
        assert!(scheduler.is_waiting_for_size());

        let calls_while_minimized = backend.calls.len();
        for _ in 0..10 {
            assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Minimized);
        }
        // No device work at all while parked
        assert_eq!(backend.calls.len(), calls_while_minimized);
        assert_eq!(backend.recreations(), 0);

        backend.extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.recreations(), 1);
        assert!(!scheduler.is_waiting_for_size());
    }

    #[test]
    fn single_slot_serializes_frames() {
        let mut scheduler = FrameScheduler::new(0); // Clamped to 1
        let mut backend = MockBackend::new(1);

        for _ in 0..5 {
            scheduler.draw_frame(&mut backend).unwrap();
        }
        assert_eq!(backend.max_in_flight, 1);
        assert_eq!(scheduler.current_slot(), 0);
    }

    #[test]
    fn outcome_reports_presentation() {
        assert!(FrameOutcome::Presented.presented());
        assert!(FrameOutcome::Recreated.presented());
        assert!(!FrameOutcome::Skipped.presented());
        assert!(!FrameOutcome::Minimized.presented());
    }
}
