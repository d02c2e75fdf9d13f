//! Audio engine: owns the host and the lazily created shared context.

use crate::config::AudioContextDesc;
use crate::context::AudioContext;
use crate::error::Result;
use crate::host::{AudioHost, CpalHost};
use std::cell::RefCell;
use std::fmt;

/// Entry point that controllers share.
///
/// The first controller that needs a context creates it; later ones reuse
/// the same handle. The context lives as long as the engine or any
/// controller holding it.
pub struct AudioEngine {
    host: Box<dyn AudioHost>,
    desc: AudioContextDesc,
    context: RefCell<Option<AudioContext>>,
}

impl AudioEngine {
    pub fn new(host: impl AudioHost + 'static) -> Self {
        Self::with_desc(host, AudioContextDesc::default())
    }

    pub fn with_desc(host: impl AudioHost + 'static, desc: AudioContextDesc) -> Self {
        Self {
            host: Box::new(host),
            desc,
            context: RefCell::new(None),
        }
    }

    pub fn host(&self) -> &dyn AudioHost {
        self.host.as_ref()
    }

    pub fn desc(&self) -> &AudioContextDesc {
        &self.desc
    }

    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    /// The shared context, created on first use.
    pub fn context(&self) -> Result<AudioContext> {
        if let Some(context) = self.context.borrow().as_ref() {
            return Ok(context.clone());
        }

        let context = AudioContext::new(self.host.as_ref(), &self.desc)?;
        *self.context.borrow_mut() = Some(context.clone());
        Ok(context)
    }

    /// Whether the shared context has been created yet.
    pub fn has_context(&self) -> bool {
        self.context.borrow().is_some()
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(CpalHost::new())
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("host", &self.host.name())
            .field("desc", &self.desc)
            .field("context", &self.context.borrow())
            .finish()
    }
}
