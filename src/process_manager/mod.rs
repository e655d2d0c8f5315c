// Model executable invocation
// File handoff codecs and the subprocess runner

pub mod codec;
pub mod model_runner;

pub use codec::{
    codec_for, decode_heavy_bytes, encode_heavy_bytes, ChunkCodec, ChunkOutput, DType, HeavyBlock, HeavyCodec,
    HeavyDescriptor, HeavyElement, SimpleCodec,
};
pub use model_runner::{InvocationContext, ModelRunner, SubprocessRunner};
