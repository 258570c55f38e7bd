//! `byBase64` collaborator: documents are equal iff their encodings are.

use super::DataComparator;
use crate::config::CompareConfig;
use crate::engine::PdfDetails;
use crate::error::PdfDiffError;
use crate::output::ComparisonResult;
use crate::pipeline::encode::encode_buffer;
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Comparator;

impl DataComparator for Base64Comparator {
    fn compare_data<'a>(
        &'a self,
        baseline: &'a PdfDetails,
        actual: &'a PdfDetails,
        _config: &'a CompareConfig,
    ) -> BoxFuture<'a, Result<ComparisonResult, PdfDiffError>> {
        async move {
            let same = encode_buffer(&baseline.buffer) == encode_buffer(&actual.buffer);
            debug!("{} vs {} by base64: {}", baseline.filename, actual.filename, same);
            Ok(if same {
                ComparisonResult::passed()
            } else {
                ComparisonResult::failed(format!(
                    "{} is not the same as {} compared by their base64 values.",
                    actual.filename, baseline.filename
                ))
            })
        }
        .boxed()
    }
}
