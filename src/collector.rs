//! Response collection for reaction-time measurement.
//!
//! A collector runs one cycle: `setup` arms it with a typed config and
//! handlers, `start(t0)` opens the collection window against the stimulus
//! onset, and the first valid event (or the timeout) resolves it. Resolution
//! happens exactly once per cycle and synchronously detaches every handler.
//!
//! Timeouts are checked event-first: an event arriving at or after the
//! deadline resolves the cycle as a timeout, never as a response.

use kurbo::Rect;

use crate::core::Timestamp;
use crate::error::{CueframeError, CueframeResult};

/// Logical keyboard input, decoupled from any windowing backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Key {
    Char(char),
    Enter,
    Space,
    Backspace,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Escape,
}

/// A host input event, already timestamped by the orchestrator's clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Key(Key),
    /// Click or touch, in presentation-surface pixels.
    Pointer { x: f64, y: f64 },
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    /// Key bound to this option.
    pub key: char,
    #[serde(default)]
    pub label: String,
    /// Selecting an exclusive option clears every other selection; selecting
    /// a non-exclusive option evicts exclusive ones.
    #[serde(default)]
    pub exclusive: bool,
}

/// Response-type dispatch, tagged the way stimulus configs are.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseKind {
    /// Timing only; resolves by timeout or `stop`.
    None,
    /// Allow-listed keys; an empty list accepts any key.
    Keypress {
        #[serde(default)]
        keys: Vec<Key>,
    },
    /// Resolves on the first selected option.
    Single { options: Vec<ChoiceOption> },
    /// Toggle selections, commit on Enter.
    Multiple { options: Vec<ChoiceOption> },
    /// Bounded integer, arrows step, digits jump, Enter or Space commits.
    Scale { min: i64, max: i64 },
    /// Streaming numeric buffer, Enter commits and validates bounds.
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Length-bounded text buffer.
    Text {
        #[serde(default)]
        min_len: usize,
        #[serde(default = "default_text_max")]
        max_len: usize,
    },
    /// Pointer coordinates normalized to the presentation surface. Click and
    /// touch input are the same thing to the collector.
    #[serde(alias = "click", alias = "touch")]
    Pointer,
}

fn default_text_max() -> usize {
    256
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CollectorConfig {
    pub question_id: String,
    #[serde(flatten)]
    pub response: ResponseKind,
    #[serde(default)]
    pub timeout_ms: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Key(Key),
    Selection(Vec<String>),
    Scale(i64),
    Number(f64),
    Text(String),
    Point { x: f64, y: f64 },
}

/// One resolved collection cycle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseEvent {
    pub question_id: String,
    /// `None` when the cycle timed out.
    pub value: Option<ResponseValue>,
    /// False for timeouts.
    pub valid: bool,
    pub timestamp: Timestamp,
    /// Milliseconds since `start(t0)`.
    pub reaction_time_ms: f64,
}

type ResponseHandler = Box<dyn FnMut(&ResponseEvent)>;
type InvalidHandler = Box<dyn FnMut(&str)>;

/// Callbacks for one collection cycle. All of them are dropped on
/// resolution; none can fire twice.
#[derive(Default)]
pub struct Handlers {
    pub on_response: Option<ResponseHandler>,
    /// Fired for rejected commits; the cycle keeps collecting.
    pub on_invalid: Option<InvalidHandler>,
    /// Fired on timeout; falls back to `on_response` with a `None` value
    /// when absent.
    pub on_timeout: Option<ResponseHandler>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Armed,
    Collecting,
    Resolved,
}

pub struct ResponseCollector {
    state: CollectorState,
    config: Option<CollectorConfig>,
    handlers: Handlers,
    /// Presentation surface used to normalize pointer input.
    surface: Rect,
    t0: Option<Timestamp>,
    paused: bool,
    // Cycle-local input buffers.
    scale_value: i64,
    selected: Vec<usize>,
    buffer: String,
}

impl Default for ResponseCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self {
            state: CollectorState::Idle,
            config: None,
            handlers: Handlers::default(),
            surface: Rect::new(0.0, 0.0, 1.0, 1.0),
            t0: None,
            paused: false,
            scale_value: 0,
            selected: Vec::new(),
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Arm the collector for one cycle. `surface` is the presentation bounds
    /// pointer input is normalized against.
    pub fn setup(
        &mut self,
        config: CollectorConfig,
        surface: Rect,
        handlers: Handlers,
    ) -> CueframeResult<()> {
        if self.state != CollectorState::Idle {
            return Err(CueframeError::validation(format!(
                "setup in state {:?}, expected Idle",
                self.state
            )));
        }
        if config.question_id.trim().is_empty() {
            return Err(CueframeError::validation("question_id must be non-empty"));
        }
        if let Some(t) = config.timeout_ms
            && (!t.is_finite() || t <= 0.0)
        {
            return Err(CueframeError::validation("timeout_ms must be > 0"));
        }
        if surface.width() <= 0.0 || surface.height() <= 0.0 {
            return Err(CueframeError::validation("surface must have positive area"));
        }
        match &config.response {
            ResponseKind::Scale { min, max } if min >= max => {
                return Err(CueframeError::validation("scale requires min < max"));
            }
            ResponseKind::Single { options } | ResponseKind::Multiple { options }
                if options.is_empty() =>
            {
                return Err(CueframeError::validation("choice requires options"));
            }
            ResponseKind::Number {
                min: Some(lo),
                max: Some(hi),
            } if lo > hi => {
                return Err(CueframeError::validation("number bounds are inverted"));
            }
            ResponseKind::Text { min_len, max_len } if min_len > max_len => {
                return Err(CueframeError::validation("text length bounds are inverted"));
            }
            _ => {}
        }

        self.scale_value = match &config.response {
            ResponseKind::Scale { min, max } => midpoint(*min, *max),
            _ => 0,
        };
        self.selected.clear();
        self.buffer.clear();
        self.surface = surface;
        self.config = Some(config);
        self.handlers = handlers;
        self.t0 = None;
        self.paused = false;
        self.state = CollectorState::Armed;
        Ok(())
    }

    /// Open the collection window. `t0` is the stimulus onset; reaction
    /// times are measured from it.
    pub fn start(&mut self, t0: Timestamp) -> CueframeResult<()> {
        if self.state != CollectorState::Armed {
            return Err(CueframeError::validation(format!(
                "start in state {:?}, expected Armed",
                self.state
            )));
        }
        self.t0 = Some(t0);
        self.state = CollectorState::Collecting;
        Ok(())
    }

    /// Abort the cycle and return to Idle. Handlers are dropped unfired.
    pub fn stop(&mut self) {
        self.state = CollectorState::Idle;
        self.config = None;
        self.handlers = Handlers::default();
        self.t0 = None;
        self.paused = false;
        self.selected.clear();
        self.buffer.clear();
    }

    /// Return a Resolved collector to Idle, ready for the next `setup`.
    pub fn teardown(&mut self) {
        self.stop();
    }

    pub fn pause(&mut self) {
        if self.state == CollectorState::Collecting {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    fn deadline(&self) -> Option<Timestamp> {
        let t0 = self.t0?;
        let timeout = self.config.as_ref()?.timeout_ms?;
        Some(Timestamp(t0.millis() + timeout))
    }

    /// Check the timeout clock. Call once per frame.
    pub fn tick(&mut self, now: Timestamp) -> Option<ResponseEvent> {
        if self.state != CollectorState::Collecting {
            return None;
        }
        let deadline = self.deadline()?;
        if now.millis() >= deadline.millis() {
            return Some(self.resolve_timeout(deadline));
        }
        None
    }

    /// Feed one input event. Returns the resolving response, if this event
    /// resolved the cycle.
    pub fn handle_event(
        &mut self,
        now: Timestamp,
        event: InputEvent,
    ) -> CueframeResult<Option<ResponseEvent>> {
        if self.state != CollectorState::Collecting || self.paused {
            return Ok(None);
        }
        // Deadline first: late events are timeouts, not responses.
        if let Some(deadline) = self.deadline()
            && now.millis() >= deadline.millis()
        {
            return Ok(Some(self.resolve_timeout(deadline)));
        }

        let Some(config) = self.config.take() else {
            return Ok(None);
        };
        let outcome = self.dispatch(&config, now, event);
        if self.config.is_none() {
            self.config = Some(config);
        }
        Ok(outcome)
    }

    fn dispatch(
        &mut self,
        config: &CollectorConfig,
        now: Timestamp,
        event: InputEvent,
    ) -> Option<ResponseEvent> {
        match (&config.response, event) {
            (ResponseKind::None, _) => None,

            (ResponseKind::Keypress { keys }, InputEvent::Key(key)) => {
                if keys.is_empty() || keys.contains(&key) {
                    Some(self.resolve(config, now, Some(ResponseValue::Key(key))))
                } else {
                    None
                }
            }

            (ResponseKind::Single { options }, InputEvent::Key(Key::Char(c))) => {
                let option = options.iter().find(|o| o.key == c)?;
                let value = ResponseValue::Selection(vec![option.id.clone()]);
                Some(self.resolve(config, now, Some(value)))
            }

            (ResponseKind::Multiple { options }, InputEvent::Key(key)) => match key {
                Key::Enter => {
                    let ids = self
                        .selected
                        .iter()
                        .filter_map(|&i| options.get(i))
                        .map(|o| o.id.clone())
                        .collect();
                    Some(self.resolve(config, now, Some(ResponseValue::Selection(ids))))
                }
                Key::Char(c) => {
                    if let Some(pos) = options.iter().position(|o| o.key == c) {
                        self.toggle_selection(options, pos);
                    }
                    None
                }
                _ => None,
            },

            (ResponseKind::Scale { min, max }, InputEvent::Key(key)) => match key {
                Key::ArrowRight | Key::ArrowUp => {
                    self.scale_value = (self.scale_value + 1).min(*max);
                    None
                }
                Key::ArrowLeft | Key::ArrowDown => {
                    self.scale_value = (self.scale_value - 1).max(*min);
                    None
                }
                Key::Char(c) if c.is_ascii_digit() => {
                    let digit = i64::from(c as u8 - b'0');
                    if (*min..=*max).contains(&digit) {
                        self.scale_value = digit;
                    }
                    None
                }
                Key::Enter | Key::Space => {
                    let value = ResponseValue::Scale(self.scale_value);
                    Some(self.resolve(config, now, Some(value)))
                }
                _ => None,
            },

            (ResponseKind::Number { min, max }, InputEvent::Key(key)) => match key {
                Key::Char(c) if c.is_ascii_digit() => {
                    self.buffer.push(c);
                    None
                }
                Key::Char('.') if !self.buffer.contains('.') => {
                    self.buffer.push('.');
                    None
                }
                Key::Char('-') if self.buffer.is_empty() => {
                    self.buffer.push('-');
                    None
                }
                Key::Backspace => {
                    self.buffer.pop();
                    None
                }
                Key::Enter => match self.buffer.parse::<f64>() {
                    Ok(n)
                        if min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi) =>
                    {
                        Some(self.resolve(config, now, Some(ResponseValue::Number(n))))
                    }
                    _ => {
                        self.reject("number outside bounds or unparseable");
                        None
                    }
                },
                _ => None,
            },

            (ResponseKind::Text { min_len, max_len }, InputEvent::Key(key)) => match key {
                Key::Char(c) => {
                    if self.buffer.chars().count() < *max_len {
                        self.buffer.push(c);
                    }
                    None
                }
                Key::Space => {
                    if self.buffer.chars().count() < *max_len {
                        self.buffer.push(' ');
                    }
                    None
                }
                Key::Backspace => {
                    self.buffer.pop();
                    None
                }
                Key::Enter => {
                    if self.buffer.chars().count() >= *min_len {
                        let value = ResponseValue::Text(std::mem::take(&mut self.buffer));
                        Some(self.resolve(config, now, Some(value)))
                    } else {
                        self.reject("text shorter than minimum length");
                        None
                    }
                }
                _ => None,
            },

            (ResponseKind::Pointer, InputEvent::Pointer { x, y }) => {
                let nx = ((x - self.surface.x0) / self.surface.width()).clamp(0.0, 1.0);
                let ny = ((y - self.surface.y0) / self.surface.height()).clamp(0.0, 1.0);
                Some(self.resolve(config, now, Some(ResponseValue::Point { x: nx, y: ny })))
            }

            _ => None,
        }
    }

    fn toggle_selection(&mut self, options: &[ChoiceOption], pos: usize) {
        if let Some(already) = self.selected.iter().position(|&i| i == pos) {
            self.selected.remove(already);
            return;
        }
        if options[pos].exclusive {
            self.selected.clear();
        } else {
            self.selected
                .retain(|&i| !options.get(i).is_some_and(|o| o.exclusive));
        }
        self.selected.push(pos);
    }

    fn reject(&mut self, reason: &str) {
        tracing::debug!(%reason, "commit rejected");
        if let Some(on_invalid) = &mut self.handlers.on_invalid {
            on_invalid(reason);
        }
    }

    fn resolve(
        &mut self,
        config: &CollectorConfig,
        now: Timestamp,
        value: Option<ResponseValue>,
    ) -> ResponseEvent {
        let t0 = self.t0.unwrap_or(now);
        let event = ResponseEvent {
            question_id: config.question_id.clone(),
            value,
            valid: true,
            timestamp: now,
            reaction_time_ms: now.since(t0),
        };
        self.finish(&event);
        event
    }

    fn resolve_timeout(&mut self, deadline: Timestamp) -> ResponseEvent {
        let t0 = self.t0.unwrap_or(deadline);
        let question_id = self
            .config
            .as_ref()
            .map(|c| c.question_id.clone())
            .unwrap_or_default();
        let event = ResponseEvent {
            question_id,
            value: None,
            valid: false,
            timestamp: deadline,
            reaction_time_ms: deadline.since(t0),
        };
        // Prefer the dedicated timeout handler, fall back to on_response.
        let mut handlers = std::mem::take(&mut self.handlers);
        self.state = CollectorState::Resolved;
        tracing::debug!(question = %event.question_id, "collection timed out");
        if let Some(mut on_timeout) = handlers.on_timeout.take() {
            on_timeout(&event);
        } else if let Some(mut on_response) = handlers.on_response.take() {
            on_response(&event);
        }
        event
    }

    fn finish(&mut self, event: &ResponseEvent) {
        let mut handlers = std::mem::take(&mut self.handlers);
        self.state = CollectorState::Resolved;
        tracing::debug!(
            question = %event.question_id,
            rt_ms = event.reaction_time_ms,
            "response resolved"
        );
        if let Some(mut on_response) = handlers.on_response.take() {
            on_response(event);
        }
    }
}

fn midpoint(min: i64, max: i64) -> i64 {
    min + (max - min) / 2
}
