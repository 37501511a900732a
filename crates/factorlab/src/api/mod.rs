//! Research backend API: payload types, transport errors and the HTTP client.

pub mod client;
pub mod error;
pub mod types;

pub use client::{FactorBackend, HttpBackend};
pub use error::BackendError;
pub use types::{
    BacktestRequest, BacktestResponse, BacktestResult, ConvertedDocument, CumulativeReturns,
    DatasetEntry, DatasetSummary, DatasetsResponse, DocumentUpload, Envelope, ExtractRequest,
    ExtractResponse, ExtractedInfo, Extraction, GenerateRequest, GenerateResponse, GeneratedCode,
    ModelInfo, ModelProbe, ModelsResponse, PerformanceStats, PerformanceTable, SolutionSummary,
    Strategy, TestModelResponse, UploadResponse,
};
