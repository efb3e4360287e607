//! Response collection scenarios: full cycles from setup through resolution,
//! including the trial binding that opens collection at stimulus onset.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use cueframe::collector::{ChoiceOption, ResponseValue};
use cueframe::core::{FitMode, Rect};
use cueframe::renderer::image::{ImageConfig, ImageRenderer};
use cueframe::resources::{PreparedImage, StaticResources};
use cueframe::{
    CollectorConfig, CollectorState, GpuContext, Handlers, InputEvent, Key, RenderContext,
    ResponseCollector, ResponseEvent, ResponseKind, Timestamp, Trial,
};

fn surface() -> Rect {
    Rect::new(0.0, 0.0, 640.0, 480.0)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn setup(kind: ResponseKind, timeout_ms: Option<f64>, handlers: Handlers) -> ResponseCollector {
    let mut c = ResponseCollector::new();
    c.setup(
        CollectorConfig {
            question_id: "q".to_string(),
            response: kind,
            timeout_ms,
        },
        surface(),
        handlers,
    )
    .unwrap();
    c
}

#[test]
fn scale_one_to_five_scenario() {
    init_tracing();
    // Default 3, two right-arrows clamp at 5, Enter commits 5.
    let resolved: Rc<RefCell<Option<ResponseEvent>>> = Rc::new(RefCell::new(None));
    let sink = resolved.clone();
    let mut c = setup(
        ResponseKind::Scale { min: 1, max: 5 },
        None,
        Handlers {
            on_response: Some(Box::new(move |ev| *sink.borrow_mut() = Some(ev.clone()))),
            on_invalid: None,
            on_timeout: None,
        },
    );
    c.start(Timestamp(0.0)).unwrap();

    c.handle_event(Timestamp(100.0), InputEvent::Key(Key::ArrowRight))
        .unwrap();
    c.handle_event(Timestamp(200.0), InputEvent::Key(Key::ArrowRight))
        .unwrap();
    c.handle_event(Timestamp(300.0), InputEvent::Key(Key::ArrowRight))
        .unwrap();
    c.handle_event(Timestamp(400.0), InputEvent::Key(Key::Enter))
        .unwrap();

    let ev = resolved.borrow().clone().unwrap();
    assert_eq!(ev.value, Some(ResponseValue::Scale(5)));
    assert_eq!(ev.reaction_time_ms, 400.0);
    assert!(ev.valid);
}

#[test]
fn exactly_one_resolution_per_cycle() {
    init_tracing();
    let fired = Rc::new(RefCell::new(0));
    let sink = fired.clone();
    let mut c = setup(
        ResponseKind::Keypress { keys: vec![] },
        Some(1000.0),
        Handlers {
            on_response: Some(Box::new(move |_| *sink.borrow_mut() += 1)),
            on_invalid: None,
            on_timeout: None,
        },
    );
    c.start(Timestamp(0.0)).unwrap();

    c.handle_event(Timestamp(10.0), InputEvent::Key(Key::Char('a')))
        .unwrap();
    // A later event, a tick past the deadline, nothing fires again.
    c.handle_event(Timestamp(20.0), InputEvent::Key(Key::Char('b')))
        .unwrap();
    assert!(c.tick(Timestamp(5000.0)).is_none());
    assert_eq!(*fired.borrow(), 1);
    assert_eq!(c.state(), CollectorState::Resolved);
}

#[test]
fn exclusive_choice_law_holds_in_both_directions() {
    init_tracing();
    let options = vec![
        ChoiceOption {
            id: "coffee".into(),
            key: 'c',
            label: "Coffee".into(),
            exclusive: false,
        },
        ChoiceOption {
            id: "tea".into(),
            key: 't',
            label: "Tea".into(),
            exclusive: false,
        },
        ChoiceOption {
            id: "none".into(),
            key: 'n',
            label: "None of the above".into(),
            exclusive: true,
        },
    ];
    let mut c = setup(ResponseKind::Multiple { options }, None, Handlers::default());
    c.start(Timestamp(0.0)).unwrap();

    let press = |c: &mut ResponseCollector, t: f64, ch: char| {
        c.handle_event(Timestamp(t), InputEvent::Key(Key::Char(ch)))
            .unwrap()
    };

    press(&mut c, 1.0, 'c');
    press(&mut c, 2.0, 't');
    press(&mut c, 3.0, 'n');
    press(&mut c, 4.0, 't');
    press(&mut c, 5.0, 'c');
    let ev = c
        .handle_event(Timestamp(6.0), InputEvent::Key(Key::Enter))
        .unwrap()
        .unwrap();
    // 'n' wiped {c, t}; then t and c re-selected, evicting n.
    assert_eq!(
        ev.value,
        Some(ResponseValue::Selection(vec!["tea".into(), "coffee".into()]))
    );
}

#[test]
fn timeout_fires_exactly_at_the_deadline() {
    init_tracing();
    let mut c = setup(
        ResponseKind::Keypress { keys: vec![] },
        Some(250.0),
        Handlers::default(),
    );
    c.start(Timestamp(100.0)).unwrap();

    assert!(c.tick(Timestamp(349.999)).is_none());
    let ev = c.tick(Timestamp(350.0)).unwrap();
    assert_eq!(ev.timestamp, Timestamp(350.0));
    assert_eq!(ev.reaction_time_ms, 250.0);
    assert!(!ev.valid);
    assert!(ev.value.is_none());
}

#[test]
fn trial_reaction_time_is_anchored_to_onset() {
    init_tracing();
    let mut res = StaticResources::new();
    res.insert_image(
        "img",
        PreparedImage {
            width: 2,
            height: 2,
            rgba8_premul: Arc::new(vec![255; 16]),
        },
    );
    let stimulus = Box::new(
        ImageRenderer::new(ImageConfig {
            id: "stim".to_string(),
            source: "img".to_string(),
            fit: FitMode::Fill,
            rect: None,
            transition: None,
        })
        .unwrap(),
    );
    let collector = setup(ResponseKind::Keypress { keys: vec![] }, None, Handlers::default());

    let mut gpu = GpuContext::new(4, 4).unwrap();
    let mut trial = Trial::new(stimulus, collector);
    trial.preload(&res).unwrap();
    trial.prepare(&mut gpu).unwrap();

    // The stimulus appears at 500 ms; the window opens that same frame.
    let onset_frame = RenderContext::new(4.0, 4.0, 1.0, Timestamp(500.0)).unwrap();
    trial.render(&mut gpu, &onset_frame).unwrap();
    assert_eq!(trial.collector().state(), CollectorState::Collecting);

    let reaction = RenderContext::new(4.0, 4.0, 1.0, Timestamp(780.0)).unwrap();
    let ev = trial
        .handle_event(&reaction, InputEvent::Key(Key::Space))
        .unwrap()
        .unwrap();
    assert_eq!(ev.reaction_time_ms, 280.0);
}

#[test]
fn collector_config_json_roundtrip() {
    init_tracing();
    let json = r#"{
        "question_id": "q7",
        "type": "scale",
        "min": 1,
        "max": 7,
        "timeout_ms": 3000.0
    }"#;
    let config: CollectorConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.question_id, "q7");
    assert_eq!(config.timeout_ms, Some(3000.0));
    assert_eq!(config.response, ResponseKind::Scale { min: 1, max: 7 });

    let back = serde_json::to_string(&config).unwrap();
    let again: CollectorConfig = serde_json::from_str(&back).unwrap();
    assert_eq!(again.response, config.response);
}
