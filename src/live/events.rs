//! Typed events of a live session.
//!
//! Each event kind is a marker type implementing [`EventKind`]; its payload type
//! is fixed at compile time and every kind has its own subscriber list.
//!
//! ```rust,no_run
//! use gladia_live::live::events;
//! # fn demo(session: &gladia_live::live::LiveV2Session) {
//! session.on::<events::Transcript>(|msg| {
//!     if msg.data.is_final {
//!         println!("{}", msg.data.utterance.text);
//!     }
//! });
//! session.once::<events::Ended>(|info| println!("ended with {}", info.code));
//! # }
//! ```

use crate::types::init::LiveV2InitResponse;
use crate::types::messages::{
    AddonMessage, AudioChunkAckMessage, ChapterizationData, EndRecordingMessage,
    LifecycleMessage, LiveV2WebSocketMessage, NamedEntityRecognitionData,
    PostFinalTranscriptMessage, PostTranscriptMessage, SentimentAnalysisData, SpeechMessage,
    StopRecordingAckMessage, SummarizationData, TranscriptMessage, TranslationData,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Handle returned by a subscription, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Logical connection number, starting at 1.
    pub connection: u32,
    /// Physical attempt within the logical connection, starting at 1.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndingInfo {
    pub code: u16,
    pub reason: Option<String>,
}

/// Every event of a session as one value, as delivered by
/// [`LiveV2Session::events`](crate::live::LiveV2Session::events).
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Started(LiveV2InitResponse),
    Connecting(ConnectionInfo),
    Connected(ConnectionInfo),
    Ending(EndingInfo),
    Ended(EndingInfo),
    Message(LiveV2WebSocketMessage),
    Error(Arc<crate::Error>),
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

/// Listeners of one event kind.
pub struct Subscribers<T> {
    listeners: Vec<Listener<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<T> Subscribers<T> {
    fn add(&mut self, id: ListenerId, once: bool, callback: Callback<T>) {
        self.listeners.push(Listener { id, once, callback });
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Callbacks to run for one emission; `once` listeners are dropped.
    fn take_for_emit(&mut self) -> Vec<Callback<T>> {
        let callbacks = self.listeners.iter().map(|l| l.callback.clone()).collect();
        self.listeners.retain(|l| !l.once);
        callbacks
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// A kind of live session event and its payload type.
pub trait EventKind: 'static {
    type Payload: Send + Sync + 'static;

    fn subscribers(registry: &mut EventRegistry) -> &mut Subscribers<Self::Payload>;
}

macro_rules! live_events {
    (
        lifecycle { $( $(#[$lmeta:meta])* $lmarker:ident => $lfield:ident: $lpayload:ty, )* }
        messages { $( $mmarker:ident => $mfield:ident: $variant:ident($mpayload:ty), )* }
    ) => {
        $(
            $(#[$lmeta])*
            pub struct $lmarker;

            impl EventKind for $lmarker {
                type Payload = $lpayload;

                fn subscribers(registry: &mut EventRegistry) -> &mut Subscribers<$lpayload> {
                    &mut registry.$lfield
                }
            }
        )*

        $(
            #[doc = concat!("Typed `", stringify!($mfield), "` message.")]
            pub struct $mmarker;

            impl EventKind for $mmarker {
                type Payload = $mpayload;

                fn subscribers(registry: &mut EventRegistry) -> &mut Subscribers<$mpayload> {
                    &mut registry.$mfield
                }
            }
        )*

        /// Subscriber lists of one session, one per event kind.
        #[derive(Default)]
        pub struct EventRegistry {
            next_id: u64,
            released: bool,
            $( $lfield: Subscribers<$lpayload>, )*
            $( $mfield: Subscribers<$mpayload>, )*
        }

        impl EventRegistry {
            fn clear(&mut self) {
                $( self.$lfield.clear(); )*
                $( self.$mfield.clear(); )*
            }

            /// Total number of registered listeners.
            pub fn listener_count(&self) -> usize {
                0 $( + self.$lfield.len() )* $( + self.$mfield.len() )*
            }
        }

        fn emit_typed(registry: &Mutex<EventRegistry>, message: &LiveV2WebSocketMessage) {
            match message {
                $( LiveV2WebSocketMessage::$variant(payload) => emit::<$mmarker>(registry, payload), )*
            }
        }
    };
}

live_events! {
    lifecycle {
        /// The session was created over HTTP.
        Started => started: LiveV2InitResponse,
        /// A socket connection attempt started.
        Connecting => connecting: ConnectionInfo,
        /// The socket is open and the audio buffer was replayed.
        Connected => connected: ConnectionInfo,
        /// The session is ending; emitted once.
        Ending => ending: EndingInfo,
        /// The session ended; emitted once, always last.
        Ended => ended: EndingInfo,
        /// Any server message, after its typed event.
        Message => message: LiveV2WebSocketMessage,
        /// A failure the caller should know about.
        Error => error: Arc<crate::Error>,
    }
    messages {
        AudioChunk => audio_chunk: AudioChunk(AudioChunkAckMessage),
        StopRecording => stop_recording: StopRecording(StopRecordingAckMessage),
        StartSession => start_session: StartSession(LifecycleMessage),
        StartRecording => start_recording: StartRecording(LifecycleMessage),
        EndRecording => end_recording: EndRecording(EndRecordingMessage),
        EndSession => end_session: EndSession(LifecycleMessage),
        SpeechStart => speech_start: SpeechStart(SpeechMessage),
        SpeechEnd => speech_end: SpeechEnd(SpeechMessage),
        Transcript => transcript: Transcript(TranscriptMessage),
        Translation => translation: Translation(AddonMessage<TranslationData>),
        NamedEntityRecognition => named_entity_recognition: NamedEntityRecognition(AddonMessage<NamedEntityRecognitionData>),
        SentimentAnalysis => sentiment_analysis: SentimentAnalysis(AddonMessage<SentimentAnalysisData>),
        PostTranscript => post_transcript: PostTranscript(PostTranscriptMessage),
        PostFinalTranscript => post_final_transcript: PostFinalTranscript(PostFinalTranscriptMessage),
        PostSummarization => post_summarization: PostSummarization(AddonMessage<SummarizationData>),
        PostChapterization => post_chapterization: PostChapterization(AddonMessage<ChapterizationData>),
    }
}

fn lock(registry: &Mutex<EventRegistry>) -> MutexGuard<'_, EventRegistry> {
    // Callbacks never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn add<E, F>(registry: &mut EventRegistry, once: bool, callback: F) -> ListenerId
where
    E: EventKind,
    F: Fn(&E::Payload) + Send + Sync + 'static,
{
    registry.next_id += 1;
    let id = ListenerId(registry.next_id);
    if !registry.released {
        E::subscribers(registry).add(id, once, Arc::new(callback));
    }
    id
}

fn emit<E: EventKind>(registry: &Mutex<EventRegistry>, payload: &E::Payload) {
    let callbacks = E::subscribers(&mut lock(registry)).take_for_emit();
    for callback in callbacks {
        callback(payload);
    }
}

/// Shared handle on a session's subscriber lists.
///
/// Callbacks run on the session's driver task, outside the registry lock, so
/// they may subscribe or unsubscribe.
#[derive(Clone, Default)]
pub(crate) struct Emitter {
    registry: Arc<Mutex<EventRegistry>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<E: EventKind>(
        &self,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> ListenerId {
        add::<E, _>(&mut lock(&self.registry), false, callback)
    }

    pub fn once<E: EventKind>(
        &self,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> ListenerId {
        add::<E, _>(&mut lock(&self.registry), true, callback)
    }

    pub fn off<E: EventKind>(&self, id: ListenerId) -> bool {
        E::subscribers(&mut lock(&self.registry)).remove(id)
    }

    pub fn remove_all(&self) {
        lock(&self.registry).clear();
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listener_count()
    }

    pub fn emit<E: EventKind>(&self, payload: &E::Payload) {
        emit::<E>(&self.registry, payload);
    }

    /// Emit `message` as its typed event, then as a generic [`Message`].
    pub fn emit_message(&self, message: &LiveV2WebSocketMessage) {
        emit_typed(&self.registry, message);
        emit::<Message>(&self.registry, message);
    }

    /// Drop every listener and ignore later subscriptions.
    pub fn release(&self) {
        let mut registry = lock(&self.registry);
        registry.clear();
        registry.released = true;
    }

    /// Forward every lifecycle, message and error event to a channel.
    ///
    /// The channel closes once the session is released.
    pub fn channel(&self) -> mpsc::UnboundedReceiver<LiveEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);

        let sender = tx.clone();
        add::<Started, _>(&mut registry, false, move |r| {
            let _ = sender.send(LiveEvent::Started(r.clone()));
        });
        let sender = tx.clone();
        add::<Connecting, _>(&mut registry, false, move |c| {
            let _ = sender.send(LiveEvent::Connecting(*c));
        });
        let sender = tx.clone();
        add::<Connected, _>(&mut registry, false, move |c| {
            let _ = sender.send(LiveEvent::Connected(*c));
        });
        let sender = tx.clone();
        add::<Ending, _>(&mut registry, false, move |e| {
            let _ = sender.send(LiveEvent::Ending(e.clone()));
        });
        let sender = tx.clone();
        add::<Ended, _>(&mut registry, false, move |e| {
            let _ = sender.send(LiveEvent::Ended(e.clone()));
        });
        let sender = tx.clone();
        add::<Message, _>(&mut registry, false, move |m| {
            let _ = sender.send(LiveEvent::Message(m.clone()));
        });
        add::<Error, _>(&mut registry, false, move |e| {
            let _ = tx.send(LiveEvent::Error(e.clone()));
        });
        rx
    }
}
