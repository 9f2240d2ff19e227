use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use log::{trace, warn};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ImportError;

/// A rolling per-frame time budget. Pure in the current time, which is always passed in.
#[derive(Debug, Copy, Clone)]
pub struct FrameBudget {
    budget: Duration,
    deadline: Instant,
}

impl FrameBudget {
    pub fn new(budget: Duration, now: Instant) -> Self {
        Self {
            budget,
            deadline: now + budget,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.deadline = now + self.budget;
    }

    pub fn is_exceeded(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub fn overrun(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.deadline)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

struct SchedulerState {
    budget: FrameBudget,
    frame: u64,
    waiters: Vec<Waker>,
}

/// Lets the import pipeline cede control back to the host once the frame budget is used up. The host calls
/// [`FrameScheduler::begin_frame`] once per frame, which re-arms the budget and resumes everyone that yielded.
/// This is pacing, not preemption: a single step between two yield points may still exceed the budget.
pub struct FrameScheduler {
    state: Mutex<SchedulerState>,
    /// Overruns longer than this are logged, if set.
    report_threshold: Option<Duration>,
}

impl FrameScheduler {
    pub fn new(budget: Duration, report_threshold: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                budget: FrameBudget::new(budget, Instant::now()),
                frame: 0,
                waiters: vec![],
            }),
            report_threshold,
        }
    }

    /// One host frame has passed.
    pub fn begin_frame(&self) {
        let waiters = {
            let mut state = self.state.lock().expect("Frame Scheduler Lock");
            state.frame += 1;
            state.budget.reset(Instant::now());
            std::mem::take(&mut state.waiters)
        };

        waiters.into_iter().for_each(Waker::wake);
    }

    pub fn frame(&self) -> u64 {
        self.state.lock().expect("Frame Scheduler Lock").frame
    }

    pub fn is_over_budget(&self) -> bool {
        self.state
            .lock()
            .expect("Frame Scheduler Lock")
            .budget
            .is_exceeded(Instant::now())
    }

    /// Returns immediately while the frame budget lasts, otherwise suspends until the next frame.
    pub async fn yield_if_over_budget(&self, label: &str) {
        let (frame, overrun) = {
            let state = self.state.lock().expect("Frame Scheduler Lock");
            let now = Instant::now();
            if !state.budget.is_exceeded(now) {
                return;
            }
            (state.frame, state.budget.overrun(now))
        };

        if let Some(threshold) = self.report_threshold
            && overrun > threshold
        {
            warn!("{} overran the frame budget by {:?}", label, overrun);
        }

        trace!("Yielding after {} in frame {}", label, frame);
        NextFrame { scheduler: self, frame }.await
    }

    /// Drives [`FrameScheduler::begin_frame`] from the tokio runtime, for hosts without a frame loop of their
    /// own. The clock stops once the scheduler is dropped.
    pub fn spawn_frame_clock(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak: Weak<FrameScheduler> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(scheduler) => scheduler.begin_frame(),
                    None => break,
                }
            }
        })
    }
}

struct NextFrame<'a> {
    scheduler: &'a FrameScheduler,
    frame: u64,
}

impl Future for NextFrame<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.scheduler.state.lock().expect("Frame Scheduler Lock");
        if state.frame > self.frame {
            return Poll::Ready(());
        }

        if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Steps a future once per host frame, without any async runtime: the explicit step function a host loop can
/// call from its update. Everything that has to run on the host's thread (creating renderable objects) runs
/// inside [`FrameDriver::tick`].
pub struct FrameDriver<'a, T> {
    scheduler: Arc<FrameScheduler>,
    future: Pin<Box<dyn Future<Output = T> + 'a>>,
    ticks: usize,
}

impl<'a, T> FrameDriver<'a, T> {
    pub fn new(scheduler: Arc<FrameScheduler>, future: impl Future<Output = T> + 'a) -> Self {
        Self {
            scheduler,
            future: Box::pin(future),
            ticks: 0,
        }
    }

    /// Starts a new frame and advances the future until it completes or yields.
    pub fn tick(&mut self) -> Poll<T> {
        self.scheduler.begin_frame();
        self.ticks += 1;
        let mut cx = Context::from_waker(Waker::noop());
        self.future.as_mut().poll(&mut cx)
    }

    /// Ticks until the future is done, giving up after `max_ticks` frames.
    pub fn run(mut self, max_ticks: usize) -> Option<T> {
        for _ in 0..max_ticks {
            if let Poll::Ready(result) = self.tick() {
                return Some(result);
            }
        }
        None
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }
}

/// Cooperative cancellation. The importer checks the token at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), ImportError> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}
