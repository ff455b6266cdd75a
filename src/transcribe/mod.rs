pub mod duration;
pub mod note;
pub mod pitch;
pub mod segmenter;

pub use duration::{classify, NoteType, DURATION_TABLE};
pub use note::Note;
pub use pitch::note_name;
pub use segmenter::Segmenter;
