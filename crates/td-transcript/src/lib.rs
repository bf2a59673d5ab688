//! # td-transcript
//!
//! Renders a ticket conversation's full history into a self-contained HTML
//! document. Rendering is a pure function of the messages and the supplied
//! timestamp: the same history always produces the same bytes, and every
//! piece of user-controlled text is escaped before it is embedded.

pub mod html;
pub mod message;

pub use html::{escape_html, HtmlTranscript, RenderContext};
pub use message::{Attachment, Embed, EmbedField, TranscriptMessage};
