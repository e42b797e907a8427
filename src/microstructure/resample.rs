use ndarray::Array2;

use super::decode::GrayImage;

/// Area-preserving (box overlap) resampling of a grayscale image to `n×n`.
///
/// Every target cell takes the overlap-weighted mean of the source pixels it
/// covers, so the mean intensity of the image is preserved. The transform is
/// separable: `out = R · img · Cᵀ`.
pub fn resample_area(img: &GrayImage, n: usize) -> GrayImage {
    let (rows, cols) = img.dim();
    if rows == n && cols == n {
        return img.clone();
    }
    let r = overlap_weights(rows, n);
    let c = overlap_weights(cols, n);
    r.dot(img).dot(&c.t())
}

/// Row-stochastic `n × src` matrix of fractional overlaps between `n` target
/// intervals and `src` source intervals on `[0, 1]`.
fn overlap_weights(src: usize, n: usize) -> Array2<f64> {
    let mut w = Array2::<f64>::zeros((n, src));
    let scale = src as f64 / n as f64;
    for t in 0..n {
        let lo = t as f64 * scale;
        let hi = (t + 1) as f64 * scale;
        let first = lo.floor() as usize;
        let last = (hi.ceil() as usize).min(src);
        for s in first..last {
            let overlap = hi.min((s + 1) as f64) - lo.max(s as f64);
            if overlap > 0.0 {
                w[[t, s]] = overlap / scale;
            }
        }
    }
    w
}

/// Thresholds a grayscale grid: values strictly above `threshold` become `1`.
pub fn binarize(img: &GrayImage, threshold: f64) -> Array2<u8> {
    img.mapv(|v| u8::from(v > threshold))
}
