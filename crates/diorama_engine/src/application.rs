//! Host application hooks and lifecycle

use thiserror::Error;

use crate::engine::{Engine, EngineError, PointerOutcome};
use crate::input::PointerEvent;

/// Host-side lifecycle around an [`Engine`] session
///
/// Implement this to drive a session from a window, a headless renderer or
/// a test harness. [`Engine::run`] calls `initialize` once, `on_frame` after
/// every rendered frame, and `cleanup` at the end.
pub trait Application {
    /// Called once before the first frame
    fn initialize(&mut self, _engine: &mut Engine) -> Result<(), AppError> {
        Ok(())
    }

    /// Called after each frame is rendered, before the clock advances
    ///
    /// # Arguments
    /// * `engine` - The session; [`Engine::output`] holds the new frame
    /// * `delta_time` - Length of the frame in seconds
    fn on_frame(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Handle a host event; the default forwards it to the engine
    fn handle_event(&mut self, engine: &mut Engine, event: AppEvent) -> Result<(), AppError> {
        match event {
            AppEvent::Resized { width, height } => engine.resize(width, height)?,
            AppEvent::Pointer(pointer) => {
                let outcome = engine.pointer_event(pointer)?;
                if outcome != PointerOutcome::None {
                    log::trace!("Pointer event {:?} -> {:?}", pointer, outcome);
                }
            }
            AppEvent::CloseRequested => engine.dispose(),
        }
        Ok(())
    }

    /// Called when the session ends
    fn cleanup(&mut self, _engine: &mut Engine) {}
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Output could not be written
    #[error("Output error: {0}")]
    Output(String),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

/// Host events
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    /// The viewport changed size
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },

    /// Pointer input in viewport pixels
    Pointer(PointerEvent),

    /// The host is closing the view
    CloseRequested,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{MemoryFetcher, ResourceCache};
    use crate::config::EngineConfig;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        initialized: bool,
        frames: Vec<u64>,
        cleaned_up: bool,
        fail_at: Option<usize>,
    }

    impl Application for Recorder {
        fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
            self.initialized = true;
            engine.load_json(r#"{ "objects": [{ "type": "box" }] }"#, None)?;
            Ok(())
        }

        fn on_frame(&mut self, engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
            if self.fail_at == Some(self.frames.len()) {
                return Err(AppError::Custom("stop".into()));
            }
            self.frames.push(engine.clock().frame_count());
            Ok(())
        }

        fn cleanup(&mut self, _engine: &mut Engine) {
            self.cleaned_up = true;
        }
    }

    fn new_engine() -> Engine {
        let cache = Arc::new(ResourceCache::new(Arc::new(MemoryFetcher::new()), ""));
        Engine::new(EngineConfig::default().with_viewport(64, 48), cache)
    }

    #[test]
    fn test_run_calls_hooks_in_order() {
        let mut engine = new_engine();
        let mut app = Recorder::default();
        engine.run(&mut app, 3, 0.016).unwrap();
        assert!(app.initialized);
        // the hook sees the frame before the clock advances
        assert_eq!(app.frames, vec![0, 1, 2]);
        assert!(app.cleaned_up);
        assert_eq!(engine.graph().children(engine.graph().root()).len(), 1);
    }

    #[test]
    fn test_hook_error_stops_run_but_cleans_up() {
        let mut engine = new_engine();
        let mut app = Recorder {
            fail_at: Some(1),
            ..Recorder::default()
        };
        assert!(matches!(engine.run(&mut app, 5, 0.016), Err(AppError::Custom(_))));
        assert_eq!(app.frames.len(), 1);
        assert!(app.cleaned_up);
    }

    #[test]
    fn test_default_event_handling() {
        let mut engine = new_engine();
        let mut app = Recorder::default();
        app.handle_event(&mut engine, AppEvent::Resized { width: 32, height: 32 }).unwrap();
        assert_eq!(engine.pipeline().width(), 32);
        app.handle_event(&mut engine, AppEvent::Pointer(PointerEvent::Down { x: 1.0, y: 1.0 }))
            .unwrap();
        app.handle_event(&mut engine, AppEvent::CloseRequested).unwrap();
        assert!(engine.is_disposed());
        assert!(app
            .handle_event(&mut engine, AppEvent::Resized { width: 8, height: 8 })
            .is_err());
    }
}
