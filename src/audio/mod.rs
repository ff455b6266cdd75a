pub mod analyzer;
pub mod decode;
pub mod filterbank;
pub mod preprocess;
pub mod spectrogram;
pub mod tempo;
pub mod window;
