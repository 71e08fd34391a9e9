//! Module weights as bytes.
//!
//! Records are serialized with the full-precision binary recorder so they
//! can cross thread boundaries as plain `Vec<u8>`.

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;

use crate::error::{Error, Result};

pub fn module_to_bytes<B: Backend, M: Module<B>>(module: &M) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    recorder
        .record(module.clone().into_record(), ())
        .map_err(|e| Error::Recorder(e.to_string()))
}

/// Load `bytes` into a module built with the same architecture as `template`.
pub fn module_from_bytes<B: Backend, M: Module<B>>(
    template: M,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<M> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(bytes, device)
        .map_err(|e| Error::Recorder(e.to_string()))?;
    Ok(template.load_record(record))
}
