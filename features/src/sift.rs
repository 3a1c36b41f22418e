//! SIFT (Scale-Invariant Feature Transform) detector and descriptor
//!
//! Keypoints are scale-space extrema of the Difference-of-Gaussians pyramid,
//! refined to sub-pixel accuracy and filtered for low contrast and edge
//! response. Each keypoint gets one or more dominant orientations and a
//! 128-dimensional gradient histogram descriptor (4x4 cells, 8 bins each).
//!
//! Intensities are processed in the 0..=255 range so thresholds follow the
//! conventional values (contrast 0.04, edge ratio 10, base sigma 1.6).

use crate::descriptor::FeatureExtractor;
use cv_core::{Descriptor, Descriptors, KeyPoint, KeyPoints};
use cv_imgproc::{
    downsample_2x_f32, gaussian_blur_f32, gray_to_f32, upsample_2x_f32, GrayFloatImage,
};
use image::GrayImage;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

/// Width of the border in which no extrema are searched.
const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;

/// Blur assumed to be already present in the input image.
const INIT_SIGMA: f32 = 0.5;

const ORI_HIST_BINS: usize = 36;
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
const ORI_PEAK_RATIO: f32 = 0.8;

const DESCR_WIDTH: usize = 4;
const DESCR_HIST_BINS: usize = 8;
const DESCR_SCL_FCTR: f32 = 3.0;
const DESCR_MAG_THR: f32 = 0.2;
const DESCR_INT_FCTR: f32 = 512.0;

pub const DESCRIPTOR_SIZE: usize = DESCR_WIDTH * DESCR_WIDTH * DESCR_HIST_BINS;

pub struct Sift {
    /// Maximum number of keypoints kept, strongest response first. 0 keeps all.
    pub n_features: usize,
    pub n_octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
    /// Double the input before building the pyramid (finds more small-scale features).
    pub upscale: bool,
}

impl Default for Sift {
    fn default() -> Self {
        Self {
            n_features: 500,
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            upscale: true,
        }
    }
}

struct Octave {
    gaussians: Vec<GrayFloatImage>,
    dogs: Vec<GrayFloatImage>,
}

/// A keypoint in the coordinates of the octave it was found in.
#[derive(Debug, Clone, Copy)]
struct ScaleSpaceFeature {
    octave: usize,
    layer: usize,
    x: f32,
    y: f32,
    /// Gaussian sigma of the keypoint, in octave pixels.
    scale: f32,
    response: f32,
    angle: f32,
}

#[inline]
fn at(img: &GrayFloatImage, r: usize, c: usize) -> f32 {
    img.as_raw()[r * img.width() as usize + c]
}

impl Sift {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    /// Factor converting octave-0 coordinates back to input pixels.
    fn first_octave_scale(&self) -> f32 {
        if self.upscale {
            0.5
        } else {
            1.0
        }
    }

    fn create_base_image(&self, image: &GrayImage) -> GrayFloatImage {
        let gray = gray_to_f32(image);
        if self.upscale {
            let sig_diff = (self.sigma * self.sigma - 4.0 * INIT_SIGMA * INIT_SIGMA)
                .max(0.01)
                .sqrt();
            gaussian_blur_f32(&upsample_2x_f32(&gray), sig_diff)
        } else {
            let sig_diff = (self.sigma * self.sigma - INIT_SIGMA * INIT_SIGMA)
                .max(0.01)
                .sqrt();
            gaussian_blur_f32(&gray, sig_diff)
        }
    }

    /// Incremental blur applied to reach each layer of an octave from the previous one.
    fn layer_sigmas(&self) -> Vec<f32> {
        let s = self.n_octave_layers;
        let k = 2f32.powf(1.0 / s as f32);
        let mut sigmas = vec![self.sigma; s + 3];
        for (i, sig) in sigmas.iter_mut().enumerate().skip(1) {
            let sig_prev = k.powi(i as i32 - 1) * self.sigma;
            let sig_total = sig_prev * k;
            *sig = (sig_total * sig_total - sig_prev * sig_prev).sqrt();
        }
        sigmas
    }

    /// Build the Gaussian and Difference-of-Gaussians pyramids.
    fn build_scale_space(&self, base: GrayFloatImage) -> Vec<Octave> {
        let s = self.n_octave_layers;
        let min_side = base.width().min(base.height()) as f32;
        let n_octaves = ((min_side.log2() - 2.0).round().max(1.0)) as usize;
        let sigmas = self.layer_sigmas();
        let min_octave_side = (2 * IMG_BORDER + 3) as u32;

        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);
        let mut next_base = Some(base);

        for _ in 0..n_octaves {
            let Some(first) = next_base.take() else {
                break;
            };
            if first.width().min(first.height()) < min_octave_side {
                break;
            }

            let mut gaussians = Vec::with_capacity(s + 3);
            gaussians.push(first);
            for sig in sigmas.iter().skip(1) {
                let blurred = gaussian_blur_f32(&gaussians[gaussians.len() - 1], *sig);
                gaussians.push(blurred);
            }

            let dogs = gaussians
                .windows(2)
                .map(|pair| {
                    let (lo, hi) = (&pair[0], &pair[1]);
                    let data = hi.as_raw().iter().zip(lo.as_raw()).map(|(a, b)| a - b).collect();
                    GrayFloatImage::from_raw(lo.width(), lo.height(), data)
                        .unwrap_or_else(|| GrayFloatImage::new(lo.width(), lo.height()))
                })
                .collect();

            next_base = Some(downsample_2x_f32(&gaussians[s]));
            octaves.push(Octave { gaussians, dogs });
        }

        octaves
    }

    fn is_extremum(&self, octave: &Octave, layer: usize, r: usize, c: usize, threshold: f32) -> bool {
        let val = at(&octave.dogs[layer], r, c);
        if val.abs() <= threshold {
            return false;
        }
        let is_max = val > 0.0;
        for dog in &octave.dogs[layer - 1..=layer + 1] {
            for rr in r - 1..=r + 1 {
                for cc in c - 1..=c + 1 {
                    let v = at(dog, rr, cc);
                    if (is_max && v > val) || (!is_max && v < val) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Sub-pixel refinement of a discrete extremum followed by contrast and edge tests.
    ///
    /// Returns the refined `(layer, r, c)` together with the offsets
    /// `(xc, xr, xi)` and the interpolated contrast.
    fn adjust_local_extremum(
        &self,
        octave: &Octave,
        layer: usize,
        r: usize,
        c: usize,
    ) -> Option<(usize, usize, usize, Vector3<f32>, f32)> {
        let img_scale = 1.0 / 255.0;
        let deriv_scale = img_scale * 0.5;
        let second_deriv_scale = img_scale;
        let cross_deriv_scale = img_scale * 0.25;

        let s = self.n_octave_layers as isize;
        let (mut layer, mut r, mut c) = (layer as isize, r as isize, c as isize);
        let width = octave.dogs[0].width() as isize;
        let height = octave.dogs[0].height() as isize;
        let border = IMG_BORDER as isize;

        let gradient = |layer: usize, r: usize, c: usize| {
            let img = &octave.dogs[layer];
            let prev = &octave.dogs[layer - 1];
            let next = &octave.dogs[layer + 1];
            Vector3::new(
                (at(img, r, c + 1) - at(img, r, c - 1)) * deriv_scale,
                (at(img, r + 1, c) - at(img, r - 1, c)) * deriv_scale,
                (at(next, r, c) - at(prev, r, c)) * deriv_scale,
            )
        };

        let mut offset = Vector3::zeros();
        let mut converged = false;

        for _ in 0..MAX_INTERP_STEPS {
            let (l, ru, cu) = (layer as usize, r as usize, c as usize);
            let img = &octave.dogs[l];
            let prev = &octave.dogs[l - 1];
            let next = &octave.dogs[l + 1];

            let d = gradient(l, ru, cu);
            let v2 = at(img, ru, cu) * 2.0;
            let dxx = (at(img, ru, cu + 1) + at(img, ru, cu - 1) - v2) * second_deriv_scale;
            let dyy = (at(img, ru + 1, cu) + at(img, ru - 1, cu) - v2) * second_deriv_scale;
            let dss = (at(next, ru, cu) + at(prev, ru, cu) - v2) * second_deriv_scale;
            let dxy = (at(img, ru + 1, cu + 1) - at(img, ru + 1, cu - 1) - at(img, ru - 1, cu + 1)
                + at(img, ru - 1, cu - 1))
                * cross_deriv_scale;
            let dxs = (at(next, ru, cu + 1) - at(next, ru, cu - 1) - at(prev, ru, cu + 1)
                + at(prev, ru, cu - 1))
                * cross_deriv_scale;
            let dys = (at(next, ru + 1, cu) - at(next, ru - 1, cu) - at(prev, ru + 1, cu)
                + at(prev, ru - 1, cu))
                * cross_deriv_scale;

            let hessian = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
            let x = hessian.lu().solve(&d)?;
            offset = -x;

            if offset.iter().all(|v| v.abs() < 0.5) {
                converged = true;
                break;
            }
            if offset.iter().any(|v| !v.is_finite() || v.abs() > (i32::MAX / 3) as f32) {
                return None;
            }

            c += offset[0].round() as isize;
            r += offset[1].round() as isize;
            layer += offset[2].round() as isize;

            if layer < 1
                || layer > s
                || c < border
                || c >= width - border
                || r < border
                || r >= height - border
            {
                return None;
            }
        }

        if !converged {
            return None;
        }

        let (l, ru, cu) = (layer as usize, r as usize, c as usize);
        let img = &octave.dogs[l];
        let d = gradient(l, ru, cu);
        let contrast = at(img, ru, cu) * img_scale + d.dot(&offset) * 0.5;
        if contrast.abs() * (s as f32) < self.contrast_threshold {
            return None;
        }

        // principal curvature ratio
        let v2 = at(img, ru, cu) * 2.0;
        let dxx = (at(img, ru, cu + 1) + at(img, ru, cu - 1) - v2) * second_deriv_scale;
        let dyy = (at(img, ru + 1, cu) + at(img, ru - 1, cu) - v2) * second_deriv_scale;
        let dxy = (at(img, ru + 1, cu + 1) - at(img, ru + 1, cu - 1) - at(img, ru - 1, cu + 1)
            + at(img, ru - 1, cu - 1))
            * cross_deriv_scale;
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let edge = self.edge_threshold;
        if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
            return None;
        }

        Some((l, ru, cu, offset, contrast.abs()))
    }

    /// Smoothed histogram of gradient orientations around `(r, c)`.
    fn orientation_histogram(img: &GrayFloatImage, r: usize, c: usize, radius: isize, sigma: f32) -> [f32; ORI_HIST_BINS] {
        let n = ORI_HIST_BINS;
        let width = img.width() as isize;
        let height = img.height() as isize;
        let exp_scale = -1.0 / (2.0 * sigma * sigma);
        let mut raw = [0.0f32; ORI_HIST_BINS];

        for i in -radius..=radius {
            let y = r as isize + i;
            if y <= 0 || y >= height - 1 {
                continue;
            }
            for j in -radius..=radius {
                let x = c as isize + j;
                if x <= 0 || x >= width - 1 {
                    continue;
                }
                let (yu, xu) = (y as usize, x as usize);
                let dx = at(img, yu, xu + 1) - at(img, yu, xu - 1);
                let dy = at(img, yu - 1, xu) - at(img, yu + 1, xu);
                let weight = (((i * i + j * j) as f32) * exp_scale).exp();
                let mag = (dx * dx + dy * dy).sqrt();
                let ori = dy.atan2(dx).to_degrees();

                let mut bin = ((n as f32 / 360.0) * ori).round() as isize;
                if bin >= n as isize {
                    bin -= n as isize;
                }
                if bin < 0 {
                    bin += n as isize;
                }
                raw[bin as usize] += weight * mag;
            }
        }

        let mut hist = [0.0f32; ORI_HIST_BINS];
        for (i, h) in hist.iter_mut().enumerate() {
            let at_offset = |o: isize| raw[(i as isize + o).rem_euclid(n as isize) as usize];
            *h = (at_offset(-2) + at_offset(2)) * (1.0 / 16.0)
                + (at_offset(-1) + at_offset(1)) * (4.0 / 16.0)
                + at_offset(0) * (6.0 / 16.0);
        }
        hist
    }

    /// Dominant orientations (degrees) within 80% of the histogram peak.
    fn dominant_orientations(hist: &[f32; ORI_HIST_BINS]) -> Vec<f32> {
        let n = ORI_HIST_BINS;
        let max = hist.iter().copied().fold(0.0f32, f32::max);
        let threshold = max * ORI_PEAK_RATIO;
        let mut angles = Vec::new();

        for j in 0..n {
            let l = if j > 0 { j - 1 } else { n - 1 };
            let r = if j < n - 1 { j + 1 } else { 0 };
            if hist[j] > hist[l] && hist[j] > hist[r] && hist[j] >= threshold {
                let denom = hist[l] - 2.0 * hist[j] + hist[r];
                let mut bin = j as f32 + if denom != 0.0 { 0.5 * (hist[l] - hist[r]) / denom } else { 0.0 };
                if bin < 0.0 {
                    bin += n as f32;
                } else if bin >= n as f32 {
                    bin -= n as f32;
                }
                let mut angle = 360.0 - (360.0 / n as f32) * bin;
                if (angle - 360.0).abs() < f32::EPSILON {
                    angle = 0.0;
                }
                angles.push(angle);
            }
        }
        angles
    }

    fn find_scale_space_extrema(&self, octaves: &[Octave]) -> Vec<ScaleSpaceFeature> {
        let s = self.n_octave_layers;
        let threshold = (0.5 * self.contrast_threshold / s as f32 * 255.0).floor();
        let mut features = Vec::new();

        for (o, octave) in octaves.iter().enumerate() {
            let width = octave.dogs[0].width() as usize;
            let height = octave.dogs[0].height() as usize;
            if width < 2 * IMG_BORDER + 1 || height < 2 * IMG_BORDER + 1 {
                continue;
            }

            for layer in 1..=s {
                let found: Vec<ScaleSpaceFeature> = (IMG_BORDER..height - IMG_BORDER)
                    .into_par_iter()
                    .flat_map_iter(|r| {
                        let mut row_features = Vec::new();
                        for c in IMG_BORDER..width - IMG_BORDER {
                            if !self.is_extremum(octave, layer, r, c, threshold) {
                                continue;
                            }
                            let Some((l, ru, cu, offset, response)) =
                                self.adjust_local_extremum(octave, layer, r, c)
                            else {
                                continue;
                            };

                            let scale = self.sigma * 2f32.powf((l as f32 + offset[2]) / s as f32);
                            let radius = (ORI_RADIUS * scale).round() as isize;
                            let hist = Self::orientation_histogram(
                                &octave.gaussians[l],
                                ru,
                                cu,
                                radius,
                                ORI_SIG_FCTR * scale,
                            );
                            for angle in Self::dominant_orientations(&hist) {
                                row_features.push(ScaleSpaceFeature {
                                    octave: o,
                                    layer: l,
                                    x: cu as f32 + offset[0],
                                    y: ru as f32 + offset[1],
                                    scale,
                                    response,
                                    angle,
                                });
                            }
                        }
                        row_features
                    })
                    .collect();
                features.extend(found);
            }
        }

        features
    }

    fn compute_descriptor(img: &GrayFloatImage, feature: &ScaleSpaceFeature) -> Vec<f32> {
        let d = DESCR_WIDTH;
        let n = DESCR_HIST_BINS;
        let width = img.width() as isize;
        let height = img.height() as isize;

        let pt_x = feature.x.round() as isize;
        let pt_y = feature.y.round() as isize;
        let mut ori = 360.0 - feature.angle;
        if (ori - 360.0).abs() < f32::EPSILON {
            ori = 0.0;
        }

        let bins_per_deg = n as f32 / 360.0;
        let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
        let hist_width = DESCR_SCL_FCTR * feature.scale;
        let max_radius = ((width * width + height * height) as f32).sqrt();
        let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5)
            .round()
            .min(max_radius) as isize;
        let cos_t = ori.to_radians().cos() / hist_width;
        let sin_t = ori.to_radians().sin() / hist_width;

        let stride_o = n + 2;
        let stride_c = d + 2;
        let mut hist = vec![0.0f32; (d + 2) * (d + 2) * (n + 2)];
        let half = d as f32 / 2.0 - 0.5;

        for i in -radius..=radius {
            for j in -radius..=radius {
                let c_rot = j as f32 * cos_t - i as f32 * sin_t;
                let r_rot = j as f32 * sin_t + i as f32 * cos_t;
                let rbin = r_rot + half;
                let cbin = c_rot + half;
                let r = pt_y + i;
                let c = pt_x + j;

                if !(rbin > -1.0 && rbin < d as f32 && cbin > -1.0 && cbin < d as f32) {
                    continue;
                }
                if r <= 0 || r >= height - 1 || c <= 0 || c >= width - 1 {
                    continue;
                }

                let (ru, cu) = (r as usize, c as usize);
                let dx = at(img, ru, cu + 1) - at(img, ru, cu - 1);
                let dy = at(img, ru - 1, cu) - at(img, ru + 1, cu);
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let mag = (dx * dx + dy * dy).sqrt() * weight;
                let mut grad_ori = dy.atan2(dx).to_degrees();
                if grad_ori < 0.0 {
                    grad_ori += 360.0;
                }
                let obin = (grad_ori - ori) * bins_per_deg;

                let r0 = rbin.floor();
                let c0 = cbin.floor();
                let o0 = obin.floor();
                let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
                let mut o0 = o0 as isize;
                if o0 < 0 {
                    o0 += n as isize;
                }
                if o0 >= n as isize {
                    o0 -= n as isize;
                }

                // trilinear interpolation over (row, col, orientation)
                let v_r1 = mag * fr;
                let v_r0 = mag - v_r1;
                let v_rc11 = v_r1 * fc;
                let v_rc10 = v_r1 - v_rc11;
                let v_rc01 = v_r0 * fc;
                let v_rc00 = v_r0 - v_rc01;
                let v_rco111 = v_rc11 * fo;
                let v_rco110 = v_rc11 - v_rco111;
                let v_rco101 = v_rc10 * fo;
                let v_rco100 = v_rc10 - v_rco101;
                let v_rco011 = v_rc01 * fo;
                let v_rco010 = v_rc01 - v_rco011;
                let v_rco001 = v_rc00 * fo;
                let v_rco000 = v_rc00 - v_rco001;

                let idx = (((r0 as isize + 1) as usize * stride_c + (c0 as isize + 1) as usize)
                    * stride_o)
                    + o0 as usize;
                hist[idx] += v_rco000;
                hist[idx + 1] += v_rco001;
                hist[idx + stride_o] += v_rco010;
                hist[idx + stride_o + 1] += v_rco011;
                hist[idx + stride_c * stride_o] += v_rco100;
                hist[idx + stride_c * stride_o + 1] += v_rco101;
                hist[idx + (stride_c + 1) * stride_o] += v_rco110;
                hist[idx + (stride_c + 1) * stride_o + 1] += v_rco111;
            }
        }

        // fold the circular orientation overflow bins and drop the spatial padding
        let mut desc = vec![0.0f32; DESCRIPTOR_SIZE];
        for i in 0..d {
            for j in 0..d {
                let idx = ((i + 1) * stride_c + (j + 1)) * stride_o;
                hist[idx] += hist[idx + n];
                hist[idx + 1] += hist[idx + n + 1];
                for k in 0..n {
                    desc[(i * d + j) * n + k] = hist[idx + k];
                }
            }
        }

        normalize_descriptor(&mut desc);
        desc
    }

    /// Detect keypoints and compute their descriptors.
    pub fn detect_and_compute(&self, image: &GrayImage) -> (KeyPoints, Descriptors) {
        if image.width() == 0 || image.height() == 0 {
            return (KeyPoints::new(), Descriptors::new());
        }

        let octaves = self.build_scale_space(self.create_base_image(image));
        let mut features = self.find_scale_space_extrema(&octaves);

        // stable: equal responses keep detection order
        features.sort_by(|a, b| b.response.total_cmp(&a.response));
        if self.n_features > 0 {
            features.truncate(self.n_features);
        }

        let descriptors = Descriptors {
            descriptors: features
                .par_iter()
                .map(|f| {
                    Descriptor::new(Self::compute_descriptor(
                        &octaves[f.octave].gaussians[f.layer],
                        f,
                    ))
                })
                .collect(),
        };

        let base_scale = self.first_octave_scale();
        let keypoints = KeyPoints {
            keypoints: features
                .iter()
                .map(|f| {
                    let scale = base_scale * (1u32 << f.octave) as f32;
                    KeyPoint::new((f.x * scale) as f64, (f.y * scale) as f64)
                        .with_size((f.scale * 2.0 * scale) as f64)
                        .with_angle(f.angle as f64)
                        .with_response(f.response as f64)
                        .with_octave(f.octave as i32)
                })
                .collect(),
        };

        (keypoints, descriptors)
    }
}

/// Clip large gradient contributions, renormalize and scale to the 0..=255 range.
fn normalize_descriptor(desc: &mut [f32]) {
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    let threshold = norm * DESCR_MAG_THR;
    for v in desc.iter_mut() {
        *v = v.min(threshold);
    }
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    let scale = DESCR_INT_FCTR / norm;
    for v in desc.iter_mut() {
        *v = (*v * scale).round().clamp(0.0, 255.0);
    }
}

impl FeatureExtractor for Sift {
    fn detect_and_compute(&self, image: &GrayImage) -> (KeyPoints, Descriptors) {
        Sift::detect_and_compute(self, image)
    }
}

pub fn sift_detect_and_compute(image: &GrayImage, n_features: usize) -> (KeyPoints, Descriptors) {
    Sift::new().with_n_features(n_features).detect_and_compute(image)
}
