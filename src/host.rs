// ============================================================================
// HOST BINDING — owns the current state, notifies subscribers, wire channel
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

use egui::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CanvasConfig;
use crate::error::{CanvasError, CanvasResult};
use crate::service::{self, GenerativeService, ServiceError, ServiceJob};
use crate::source::{EncodedImage, SourceImage, decode_in_background};
use crate::viewport::{Command, Query, QueryResult, ViewportState};

/// Called after every successful transition with the new state and the
/// command that produced it.
pub type Subscriber = Box<dyn Fn(&ViewportState, &Command) + Send + Sync>;

/// One message on the encoded host channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostMessage {
    Command(Command),
    Query(Query),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostReply {
    Done,
    Answer(QueryResult),
    Failed(String),
}

/// In-flight service call, tied to the session it was built from.
struct PendingSubmit {
    session: Uuid,
    rx: Receiver<Result<EncodedImage, ServiceError>>,
}

/// The single owner of a viewport's state on the host side.
pub struct ViewportCanvas {
    state: ViewportState,
    subscribers: Vec<Subscriber>,
    pending_load: Option<Receiver<CanvasResult<SourceImage>>>,
    pending_submit: Option<PendingSubmit>,
}

impl ViewportCanvas {
    pub fn new(config: CanvasConfig, container: Vec2) -> Self {
        Self {
            state: ViewportState::new(config, container),
            subscribers: Vec::new(),
            pending_load: None,
            pending_submit: None,
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn subscribe(&mut self, f: impl Fn(&ViewportState, &Command) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(f));
    }

    fn commit(&mut self, next: ViewportState, cmd: &Command) {
        self.state = next;
        for s in &self.subscribers {
            s(&self.state, cmd);
        }
    }

    /// Run one transition.  On error the current state is kept.
    pub fn dispatch(&mut self, cmd: &Command) -> CanvasResult<&ViewportState> {
        match self.state.execute(cmd) {
            Ok(next) => {
                self.commit(next, cmd);
                Ok(&self.state)
            }
            Err(e) => {
                crate::log_warn!("{} rejected: {}", cmd.name(), e);
                Err(e)
            }
        }
    }

    pub fn query(&self, q: &Query) -> CanvasResult<QueryResult> {
        self.state.query(q)
    }

    /// Handle one bincode-encoded [`HostMessage`] and return the encoded
    /// [`HostReply`].  Malformed input yields a `Failed` reply, never a panic.
    pub fn execute_encoded(&mut self, bytes: &[u8]) -> Vec<u8> {
        let reply = match bincode::deserialize::<HostMessage>(bytes) {
            Ok(HostMessage::Command(cmd)) => match self.dispatch(&cmd) {
                Ok(_) => HostReply::Done,
                Err(e) => HostReply::Failed(e.to_string()),
            },
            Ok(HostMessage::Query(q)) => match self.query(&q) {
                Ok(answer) => HostReply::Answer(answer),
                Err(e) => HostReply::Failed(e.to_string()),
            },
            Err(e) => HostReply::Failed(CanvasError::from(e).to_string()),
        };
        bincode::serialize(&reply).unwrap_or_else(|e| {
            crate::log_err!("failed to encode host reply: {}", e);
            bincode::serialize(&HostReply::Failed(e.to_string())).unwrap_or_default()
        })
    }

    // ---- background work --------------------------------------------------

    /// Decode `encoded` on a worker thread; [`poll`](Self::poll) installs it.
    /// A newer load supersedes an older one still in flight.
    pub fn begin_load(&mut self, encoded: EncodedImage) {
        self.pending_load = Some(decode_in_background(encoded));
    }

    /// Start a service call for the current session.  Returns false when a
    /// call is already in flight: one submission per session at a time.
    pub fn begin_submit(&mut self, service: Arc<dyn GenerativeService>, job: ServiceJob) -> bool {
        if self.pending_submit.is_some() {
            return false;
        }
        self.pending_submit = Some(PendingSubmit {
            session: self.state.session(),
            rx: service::submit_in_background(service, job),
        });
        true
    }

    pub fn is_busy(&self) -> bool {
        self.pending_load.is_some() || self.pending_submit.is_some()
    }

    /// Apply finished background work.  Returns the outcome of anything that
    /// completed during this call.
    pub fn poll(&mut self) -> Vec<CanvasResult<()>> {
        let mut done = Vec::new();

        if let Some(rx) = &self.pending_load {
            match rx.try_recv() {
                Ok(result) => {
                    self.pending_load = None;
                    done.push(result.map(|image| {
                        // Subscribers see the payload as decoded, MIME corrected.
                        let cmd = Command::LoadImage(image.encoded().clone());
                        let next = self.state.with_loaded(image);
                        self.commit(next, &cmd);
                    }));
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.pending_load = None;
                    done.push(Err(CanvasError::Decode("decoder thread vanished".to_string())));
                }
            }
        }

        if let Some(pending) = &self.pending_submit {
            let response = match pending.rx.try_recv() {
                Ok(r) => Some(r),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    Some(Err(ServiceError::Transport("service thread vanished".to_string())))
                }
            };
            if let Some(response) = response {
                let session = pending.session;
                self.pending_submit = None;
                if session != self.state.session() {
                    crate::log_warn!("dropping service result for stale session {}", session);
                } else {
                    done.push(service::complete(&self.state, response).map(|next| {
                        let cmd = match next.source() {
                            Some(src) => Command::ReplaceSource(src.encoded().clone()),
                            None => Command::Reset,
                        };
                        self.commit(next, &cmd);
                    }));
                }
            }
        }

        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{EditRequest, ExpandRequest};
    use crate::source::ImageMime;
    use crate::viewport::Tool;
    use egui::vec2;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn png(w: u32, h: u32) -> EncodedImage {
        EncodedImage::encode(&RgbaImage::from_pixel(w, h, Rgba([5, 5, 5, 255])), ImageMime::Png, 92)
            .unwrap()
    }

    fn canvas() -> ViewportCanvas {
        ViewportCanvas::new(CanvasConfig::default(), vec2(400.0, 400.0))
    }

    fn poll_until_done(c: &mut ViewportCanvas) -> Vec<CanvasResult<()>> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let done = c.poll();
            if !done.is_empty() || Instant::now() > deadline {
                return done;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn subscribers_see_each_commit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = canvas();
        let log = seen.clone();
        c.subscribe(move |_, cmd| log.lock().unwrap().push(cmd.name()));
        c.dispatch(&Command::LoadImage(png(8, 8))).unwrap();
        c.dispatch(&Command::SetTool(Tool::Paint)).unwrap();
        assert!(c.dispatch(&Command::SetAspectRatio("0:1".into())).is_err());
        assert_eq!(*seen.lock().unwrap(), vec!["load_image", "set_tool"]);
    }

    #[test]
    fn encoded_channel_round_trip() {
        let mut c = canvas();
        let msg = bincode::serialize(&HostMessage::Command(Command::LoadImage(png(800, 600)))).unwrap();
        let reply: HostReply = bincode::deserialize(&c.execute_encoded(&msg)).unwrap();
        assert_eq!(reply, HostReply::Done);

        let msg = bincode::serialize(&HostMessage::Query(Query::ImageDrawRect)).unwrap();
        let reply: HostReply = bincode::deserialize(&c.execute_encoded(&msg)).unwrap();
        match reply {
            HostReply::Answer(QueryResult::Rect(r)) => {
                assert!((r.y - 50.0).abs() < 0.01 && (r.height - 300.0).abs() < 0.01)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_bytes_fail_gracefully() {
        let mut c = canvas();
        let reply: HostReply = bincode::deserialize(&c.execute_encoded(&[0xff, 0xff, 0xff])).unwrap();
        assert!(matches!(reply, HostReply::Failed(_)));
    }

    #[test]
    fn unbounded_stroke_over_the_wire_is_refused() {
        let mut c = canvas();
        c.dispatch(&Command::LoadImage(png(100, 100))).unwrap();
        c.dispatch(&Command::SetTool(Tool::Paint)).unwrap();
        let msg = bincode::serialize(&HostMessage::Command(Command::PaintStroke {
            from: egui::pos2(0.0, 0.0),
            to: egui::pos2(f32::INFINITY, 0.0),
        }))
        .unwrap();
        let reply: HostReply = bincode::deserialize(&c.execute_encoded(&msg)).unwrap();
        assert!(matches!(reply, HostReply::Failed(_)));
        assert!(c.state().mask().is_empty());

        let msg = bincode::serialize(&HostMessage::Command(Command::PaintStroke {
            from: egui::pos2(200.0, 200.0),
            to: egui::pos2(1e20, 200.0),
        }))
        .unwrap();
        let reply: HostReply = bincode::deserialize(&c.execute_encoded(&msg)).unwrap();
        assert_eq!(reply, HostReply::Done);
        assert!(!c.state().mask().is_empty());
    }

    #[test]
    fn background_work_notifies_with_the_new_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = canvas();
        let log = seen.clone();
        c.subscribe(move |state, cmd| {
            let payload = match cmd {
                Command::LoadImage(p) | Command::ReplaceSource(p) => Some(p.clone()),
                _ => None,
            };
            let matches = payload.as_ref() == state.source().map(|s| s.encoded());
            log.lock().unwrap().push((cmd.name(), matches));
        });

        c.begin_load(png(40, 20));
        assert!(poll_until_done(&mut c)[0].is_ok());
        let job = ServiceJob::Edit(service::edit_request(c.state(), "sky").unwrap());
        assert!(c.begin_submit(Arc::new(Echo), job));
        assert!(poll_until_done(&mut c)[0].is_ok());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("load_image", true), ("replace_source", true)]
        );
    }

    #[test]
    fn background_load_installs_image() {
        let mut c = canvas();
        c.begin_load(png(20, 10));
        let done = poll_until_done(&mut c);
        assert_eq!(done.len(), 1);
        assert!(done[0].is_ok());
        assert!(c.state().is_loaded());
        assert!(!c.is_busy());
    }

    struct Echo;

    impl GenerativeService for Echo {
        fn submit_edit(&self, r: &EditRequest) -> Result<EncodedImage, ServiceError> {
            Ok(r.payload.image.clone())
        }
        fn submit_expand(&self, r: &ExpandRequest) -> Result<EncodedImage, ServiceError> {
            Ok(r.payload.image.clone())
        }
    }

    #[test]
    fn one_submission_at_a_time() {
        let mut c = canvas();
        c.dispatch(&Command::LoadImage(png(40, 40))).unwrap();
        c.dispatch(&Command::SetTool(Tool::Expand)).unwrap();
        c.dispatch(&Command::SetAspectRatio("2:1".into())).unwrap();
        let job = ServiceJob::Expand(service::expand_request(c.state()).unwrap());
        assert!(c.begin_submit(Arc::new(Echo), job.clone()));
        assert!(!c.begin_submit(Arc::new(Echo), job));
        let done = poll_until_done(&mut c);
        assert!(done[0].is_ok());
        // Expanded canvas came back as the new source: 800×400.
        let src = c.state().source().unwrap();
        assert_eq!((src.natural_width(), src.natural_height()), (800, 400));
    }
}
