//! # Render Scheduler
//!
//! The control loop that decides when a frame is recomputed and how it is
//! presented. Each tick walks `Idle → Composing → Presenting → Idle`:
//!
//! 1. reduce the wall clock to a [`TimeKey`]
//! 2. resolve content from the store (reloaded every tick) and re-roll the
//!    decorative selection
//! 3. decide whether to draw and with which [`RefreshMode`]
//! 4. compose the frame and hand it to the display
//!
//! ## Policies
//! - **Timed**: draw on every tick. A cycle counter starting at zero requests a
//!   full refresh every `full_refresh_every` cycles and a partial one otherwise.
//! - **Change detection**: draw only when the time key, phrase or icon differ
//!   from the last frame that was actually presented. Draws use a full refresh.
//!
//! [`RenderState`] is only updated after a successful present, so a failed
//! draw is retried on the next tick. Neither a broken content store nor a
//! failing display stops the loop.

use crate::composer::{Composer, FrameStyle};
use crate::config::Config;
use crate::content::{resolve, ContentStore, ResolveRules};
use crate::decor::Decorations;
use crate::display::{Display, RefreshMode};
use crate::layout::FontBook;
use crate::{DecorativeSelection, TimeKey};
use chrono::{Local, Timelike};
use embedded_graphics::prelude::Size;
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// When frames are redrawn and with which refresh mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPolicy {
    /// Redraw unconditionally every `interval`
    Timed {
        interval: Duration,
        full_refresh_every: u64,
    },
    /// Poll every `poll`, redraw only on change
    ChangeDetection { poll: Duration },
}

impl RenderPolicy {
    /// Tick period of the loop.
    pub fn interval(&self) -> Duration {
        match self {
            RenderPolicy::Timed { interval, .. } => *interval,
            RenderPolicy::ChangeDetection { poll } => *poll,
        }
    }
}

/// What was on the display after the last successful present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderState {
    pub last_time_key: Option<TimeKey>,
    pub last_phrase: Option<String>,
    pub last_icon: Option<String>,
}

impl RenderState {
    fn matches(&self, key: &TimeKey, selection: Option<&DecorativeSelection>) -> bool {
        self.last_time_key.as_ref() == Some(key)
            && self.last_phrase.as_deref() == selection.map(|s| s.phrase.as_str())
            && self.last_icon.as_deref() == selection.map(|s| s.icon.as_str())
    }

    fn record(&mut self, key: TimeKey, selection: Option<DecorativeSelection>) {
        self.last_time_key = Some(key);
        match selection {
            Some(selection) => {
                self.last_phrase = Some(selection.phrase);
                self.last_icon = Some(selection.icon);
            }
            None => {
                self.last_phrase = None;
                self.last_icon = None;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Composing,
    Presenting,
}

/// Result of a single scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changed since the last present, display left alone
    Unchanged,
    /// A frame was presented with this refresh mode
    Presented(RefreshMode),
    /// The display rejected the frame; state was not updated
    Failed,
}

pub struct RenderScheduler<S, D> {
    store: S,
    display: D,
    composer: Composer,
    rules: ResolveRules,
    decorations: Option<Decorations>,
    policy: RenderPolicy,
    canvas: Size,
    state: RenderState,
    cycle: u64,
    phase: SchedulerPhase,
}

impl<S: ContentStore, D: Display> RenderScheduler<S, D> {
    pub fn new(
        store: S,
        display: D,
        composer: Composer,
        rules: ResolveRules,
        policy: RenderPolicy,
        canvas: Size,
    ) -> Self {
        Self {
            store,
            display,
            composer,
            rules,
            decorations: None,
            policy,
            canvas,
            state: RenderState::default(),
            cycle: 0,
            phase: SchedulerPhase::Idle,
        }
    }

    /// Scheduler wired from configuration, with random decorations unless
    /// `render.decorations` is off.
    pub fn from_config(store: S, display: D, config: &Config) -> Self {
        let scheduler = Self::new(
            store,
            display,
            Composer::new(FontBook::default(), FrameStyle::from(config)),
            ResolveRules::from(&config.content),
            config.render.policy(),
            Size::new(config.display.width, config.display.height),
        );
        if config.render.decorations {
            scheduler.with_decorations(Decorations::random(&config.decorations))
        } else {
            scheduler
        }
    }

    pub fn with_decorations(mut self, decorations: Decorations) -> Self {
        self.decorations = Some(decorations);
        self
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Number of timed cycles run so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn policy(&self) -> RenderPolicy {
        self.policy
    }

    /// Run one scheduling cycle for the wall-clock time `now`.
    pub fn tick<T: Timelike>(&mut self, now: &T) -> TickOutcome {
        let key = TimeKey::from_time(now);
        let content = resolve(&self.store, &key, &self.rules);
        let selection = self.decorations.as_mut().map(Decorations::roll);

        let refresh = match self.policy {
            RenderPolicy::Timed {
                full_refresh_every, ..
            } => {
                let mode = if self.cycle % full_refresh_every.max(1) == 0 {
                    RefreshMode::Full
                } else {
                    RefreshMode::Partial
                };
                self.cycle += 1;
                mode
            }
            RenderPolicy::ChangeDetection { .. } => {
                if self.state.matches(&key, selection.as_ref()) {
                    debug!("{} unchanged, skipping redraw", key);
                    return TickOutcome::Unchanged;
                }
                RefreshMode::Full
            }
        };

        self.phase = SchedulerPhase::Composing;
        let frame = self
            .composer
            .compose(&key, &content, selection.as_ref(), self.canvas);

        self.phase = SchedulerPhase::Presenting;
        let result = self
            .display
            .set_frame(&frame)
            .and_then(|()| self.display.present(refresh));
        self.phase = SchedulerPhase::Idle;

        match result {
            Ok(()) => {
                info!("Presented {} ({}) with {:?} refresh", key, content.reference, refresh);
                self.state.record(key, selection);
                TickOutcome::Presented(refresh)
            }
            Err(e) => {
                error!("Display update for {} failed: {}", key, e);
                TickOutcome::Failed
            }
        }
    }

    /// Tick forever on the policy interval using local time.
    ///
    /// Store and display calls block, so each tick runs under
    /// `block_in_place`; this needs the multi-threaded runtime.
    pub async fn run(mut self) {
        let mut ticker = interval(self.policy.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Render loop started: {:?}", self.policy);

        loop {
            ticker.tick().await;
            let now = Local::now().naive_local();
            tokio::task::block_in_place(|| self.tick(&now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryStore;
    use crate::decor::SequenceSelector;
    use crate::display::DisplayError;
    use crate::frame::{Frame, Zone};
    use chrono::NaiveTime;

    /// Records every call instead of drawing.
    #[derive(Default)]
    struct RecordingDisplay {
        frames: Vec<Frame>,
        presents: Vec<RefreshMode>,
        fail: bool,
    }

    impl Display for RecordingDisplay {
        fn set_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn present(&mut self, mode: RefreshMode) -> Result<(), DisplayError> {
            if self.fail {
                return Err(DisplayError::NoFrame);
            }
            self.presents.push(mode);
            Ok(())
        }
    }

    fn at(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::new([("09:05", "John 3:16 – For God so loved the world")])
    }

    fn scheduler(policy: RenderPolicy) -> RenderScheduler<MemoryStore, RecordingDisplay> {
        RenderScheduler::new(
            store(),
            RecordingDisplay::default(),
            Composer::new(FontBook::default(), FrameStyle::default()),
            ResolveRules::default(),
            policy,
            Size::new(400, 300),
        )
    }

    fn decorations(phrases: &[&str], icons: &[&str]) -> Decorations {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Decorations::new(
            Box::new(SequenceSelector::new(owned(phrases))),
            Box::new(SequenceSelector::new(owned(icons))),
        )
    }

    const CHANGE_DETECTION: RenderPolicy = RenderPolicy::ChangeDetection {
        poll: Duration::from_secs(5),
    };

    #[test]
    fn test_timed_full_refresh_cadence() {
        let mut scheduler = scheduler(RenderPolicy::Timed {
            interval: Duration::from_secs(60),
            full_refresh_every: 3,
        });
        let outcomes: Vec<TickOutcome> = (0..7).map(|_| scheduler.tick(&at(9, 5, 0))).collect();

        use RefreshMode::{Full, Partial};
        let expected = [Full, Partial, Partial, Full, Partial, Partial, Full];
        assert_eq!(scheduler.display().presents, expected);
        assert!(outcomes.iter().all(|o| matches!(o, TickOutcome::Presented(_))));
        assert_eq!(scheduler.cycle(), 7);
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
    }

    #[test]
    fn test_timed_redraws_identical_content() {
        let mut scheduler = scheduler(RenderPolicy::Timed {
            interval: Duration::from_secs(60),
            full_refresh_every: 60,
        });
        scheduler.tick(&at(9, 5, 0));
        scheduler.tick(&at(9, 5, 30));
        assert_eq!(scheduler.display().frames.len(), 2);
        assert_eq!(scheduler.display().frames[0], scheduler.display().frames[1]);
    }

    #[test]
    fn test_change_detection_skips_identical_ticks() {
        let mut scheduler =
            scheduler(CHANGE_DETECTION).with_decorations(decorations(&["Be still"], &["*"]));

        assert_eq!(scheduler.tick(&at(9, 5, 1)), TickOutcome::Presented(RefreshMode::Full));
        assert_eq!(scheduler.tick(&at(9, 5, 6)), TickOutcome::Unchanged);
        assert_eq!(scheduler.tick(&at(9, 5, 59)), TickOutcome::Unchanged);
        assert_eq!(scheduler.display().presents.len(), 1);

        // Minute change draws exactly once
        assert_eq!(scheduler.tick(&at(9, 6, 0)), TickOutcome::Presented(RefreshMode::Full));
        assert_eq!(scheduler.tick(&at(9, 6, 5)), TickOutcome::Unchanged);
        assert_eq!(scheduler.display().presents.len(), 2);
    }

    #[test]
    fn test_change_detection_reacts_to_phrase_change() {
        let mut scheduler = scheduler(CHANGE_DETECTION)
            .with_decorations(decorations(&["Be still", "Be still", "Rejoice"], &["*"]));

        scheduler.tick(&at(9, 5, 0));
        assert_eq!(scheduler.tick(&at(9, 5, 5)), TickOutcome::Unchanged);
        assert_eq!(scheduler.tick(&at(9, 5, 10)), TickOutcome::Presented(RefreshMode::Full));
        assert_eq!(scheduler.state().last_phrase.as_deref(), Some("Rejoice"));
        assert_eq!(scheduler.display().presents.len(), 2);
    }

    #[test]
    fn test_change_detection_reacts_to_icon_change() {
        let mut scheduler =
            scheduler(CHANGE_DETECTION).with_decorations(decorations(&["Be still"], &["*", "+"]));

        scheduler.tick(&at(9, 5, 0));
        assert!(matches!(scheduler.tick(&at(9, 5, 5)), TickOutcome::Presented(_)));
        assert_eq!(scheduler.state().last_icon.as_deref(), Some("+"));
    }

    #[test]
    fn test_failed_present_leaves_state_untouched() {
        let mut scheduler = scheduler(CHANGE_DETECTION);
        scheduler.display.fail = true;

        assert_eq!(scheduler.tick(&at(9, 5, 0)), TickOutcome::Failed);
        assert_eq!(scheduler.state(), &RenderState::default());
        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);

        // Same key retried once the display recovers
        scheduler.display.fail = false;
        assert_eq!(scheduler.tick(&at(9, 5, 5)), TickOutcome::Presented(RefreshMode::Full));
        assert_eq!(scheduler.state().last_time_key, TimeKey::parse("09:05"));
    }

    #[test]
    fn test_missing_key_renders_sentinel() {
        let mut scheduler = scheduler(CHANGE_DETECTION);
        scheduler.tick(&at(9, 6, 0));

        let frame = &scheduler.display().frames[0];
        let reference: Vec<&str> = frame
            .texts_in(Zone::Reference)
            .map(|op| op.text.as_str())
            .collect();
        assert_eq!(reference, vec!["No verse set for this time."]);
        assert_eq!(frame.texts_in(Zone::Verse).count(), 0);
    }

    #[test]
    fn test_from_config_uses_render_section() {
        let mut config = Config::default();
        config.render.decorations = false;
        config.render.whole_hour_mode = true;
        let mut scheduler = RenderScheduler::from_config(store(), RecordingDisplay::default(), &config);

        assert_eq!(scheduler.policy(), config.render.policy());
        scheduler.tick(&at(14, 0, 0));
        let frame = &scheduler.display().frames[0];
        assert_eq!(frame.texts_in(Zone::Clock).count(), 1);
        assert_eq!(frame.texts_in(Zone::Decoration).count(), 0);
    }
}
