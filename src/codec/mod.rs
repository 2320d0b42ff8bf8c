pub mod data_stream;
pub mod lines;

pub use data_stream::{
    DecodeError,
    FinishReason,
    ParseProtocolError,
    StreamPart,
    StreamProtocol,
    DATA_STREAM_HEADER,
    DATA_STREAM_VERSION,
};
pub use lines::{ LineBuffer, TextDecoder };
