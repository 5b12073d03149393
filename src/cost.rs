// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the goal-matching cost functions and the aggregation of per-step costs.
//!
//! All costs follow the convention that lower is better.
use image::imageops;
use nalgebra::{DMatrix, DVector};

use crate::exception::{create_rollout_exception, MpcException, MpcResult};
use crate::state::{Image, Mask, Observation};

/// Cost function comparing an observation with a goal image.
///
/// The variant is chosen once at configuration time.
#[derive(Debug, Clone, PartialEq)]
pub enum CostFunction {
    /// L2 norm of the pixel difference.
    Dense,
    /// `1` if the dense distance exceeds `threshold`, `0` otherwise.
    Sparse { threshold: f64 },
    /// Dense distance where differences at robot pixels are scaled by `robot_pixel_weight`.
    /// A pixel which belongs to the robot in both the goal and the observation is scaled twice.
    Weighted { robot_pixel_weight: f64 },
    /// Robot pixels of goal and observation are replaced by `background` before comparing.
    Inpaint { background: Image },
    /// Robot pixels of goal and observation are set to black before comparing.
    BlackRobot,
    /// Like [`Inpaint`](`Self::Inpaint`) but compares Gaussian blurred images until the
    /// remaining horizon is at most `unblur_timestep`. From there on the unblurred distance
    /// scaled by `unblur_cost_scale` is used.
    InpaintBlur {
        background: Image,
        sigma: f64,
        unblur_cost_scale: f64,
        unblur_timestep: f64,
    },
}

/// A goal frame preprocessed for one [`CostFunction`].
#[derive(Debug, Clone)]
pub struct PreparedGoal {
    image: Image,
    mask: Option<Mask>,
    blurred: Option<Image>,
}

impl PreparedGoal {
    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl CostFunction {
    /// Preprocesses a goal frame. Inpainting, blackening and blurring of goals is done here
    /// once per planning call instead of once per candidate and step.
    pub fn prepare_goal(&self, image: &Image, mask: Option<&Mask>) -> MpcResult<PreparedGoal> {
        check_mask_fits(image, mask)?;
        let mut prepared = image.clone();
        let mut blurred = None;
        match self {
            CostFunction::Inpaint { background } => {
                check_same_size(image, background)?;
                if let Some(mask) = mask {
                    prepared.fill_masked_from(mask, background);
                }
            }
            CostFunction::InpaintBlur {
                background, sigma, ..
            } => {
                check_same_size(image, background)?;
                if let Some(mask) = mask {
                    prepared.fill_masked_from(mask, background);
                }
                blurred = Some(blur(&prepared, *sigma));
            }
            CostFunction::BlackRobot => {
                if let Some(mask) = mask {
                    prepared.fill_masked(mask, [0, 0, 0]);
                }
            }
            CostFunction::Dense | CostFunction::Sparse { .. } | CostFunction::Weighted { .. } => {}
        }
        Ok(PreparedGoal {
            image: prepared,
            mask: mask.cloned(),
            blurred,
        })
    }

    /// Computes the cost of `observation` at time step `step` (0-based) of a plan with the
    /// given horizon.
    /// # Errors
    /// * [`RolloutException`](`crate::exception::MpcException::RolloutException`) if observation
    /// and goal do not have the same size or the robot mask does not fit the observation.
    pub fn cost(
        &self,
        observation: &Observation,
        goal: &PreparedGoal,
        step: usize,
        horizon: usize,
    ) -> MpcResult<f64> {
        check_same_size(&observation.image, &goal.image)?;
        let robot = observation.mask.as_ref();
        check_mask_fits(&observation.image, robot)?;
        match self {
            CostFunction::Dense => Ok(pixel_distance(&observation.image, &goal.image)),
            CostFunction::Sparse { threshold } => {
                let distance = pixel_distance(&observation.image, &goal.image);
                Ok(if distance > *threshold { 1. } else { 0. })
            }
            CostFunction::Weighted { robot_pixel_weight } => Ok(weighted_distance(
                &observation.image,
                &goal.image,
                robot,
                goal.mask.as_ref(),
                *robot_pixel_weight,
            )),
            CostFunction::Inpaint { background } => {
                let mut achieved = observation.image.clone();
                if let Some(robot) = robot {
                    achieved.fill_masked_from(robot, background);
                }
                Ok(pixel_distance(&achieved, &goal.image))
            }
            CostFunction::BlackRobot => {
                let mut achieved = observation.image.clone();
                if let Some(robot) = robot {
                    achieved.fill_masked(robot, [0, 0, 0]);
                }
                Ok(pixel_distance(&achieved, &goal.image))
            }
            CostFunction::InpaintBlur {
                background,
                sigma,
                unblur_cost_scale,
                ..
            } => {
                let mut achieved = observation.image.clone();
                if let Some(robot) = robot {
                    achieved.fill_masked_from(robot, background);
                }
                if self.uses_unblurred_cost(step, horizon) {
                    Ok(unblur_cost_scale * pixel_distance(&achieved, &goal.image))
                } else {
                    let blurred_goal = goal.blurred.as_ref().ok_or_else(|| {
                        create_rollout_exception("goal was not prepared for a blurred cost")
                    })?;
                    Ok(pixel_distance(&blur(&achieved, *sigma), blurred_goal))
                }
            }
        }
    }

    /// Whether step `step` (0-based) of a plan with the given horizon is scored with the
    /// unblurred cost. Only [`InpaintBlur`](`Self::InpaintBlur`) ever switches; the switch step
    /// itself is already unblurred.
    pub fn uses_unblurred_cost(&self, step: usize, horizon: usize) -> bool {
        match self {
            CostFunction::InpaintBlur {
                unblur_timestep, ..
            } => {
                let remaining = horizon.saturating_sub(step) as f64;
                remaining <= *unblur_timestep
            }
            _ => false,
        }
    }
}

/// Sums the per-step costs (J x L) of every candidate over the horizon.
/// # Errors
/// * [`AggregationException`](`crate::exception::MpcException::AggregationException`) if not a
/// single candidate has a finite total.
pub fn aggregate(per_step_cost: &DMatrix<f64>) -> MpcResult<DVector<f64>> {
    let totals = DVector::from_iterator(
        per_step_cost.nrows(),
        per_step_cost.row_iter().map(|row| row.sum()),
    );
    if !totals.iter().any(|cost| cost.is_finite()) {
        return Err(MpcException::AggregationException {
            message: format!(
                "none of the {} candidates has a finite cost",
                per_step_cost.nrows()
            ),
        });
    }
    Ok(totals)
}

fn check_same_size(a: &Image, b: &Image) -> MpcResult<()> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(create_rollout_exception(format!(
            "cannot compare a {}x{} image with a {}x{} image",
            a.width(),
            a.height(),
            b.width(),
            b.height()
        )));
    }
    Ok(())
}

fn check_mask_fits(image: &Image, mask: Option<&Mask>) -> MpcResult<()> {
    match mask {
        Some(mask) if !mask.fits(image) => Err(create_rollout_exception(format!(
            "a {}x{} mask does not fit a {}x{} image",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        ))),
        _ => Ok(()),
    }
}

fn pixel_distance(a: &Image, b: &Image) -> f64 {
    a.data()
        .iter()
        .zip(b.data().iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn weighted_distance(
    achieved: &Image,
    goal: &Image,
    achieved_mask: Option<&Mask>,
    goal_mask: Option<&Mask>,
    weight: f64,
) -> f64 {
    let is_robot = |mask: Option<&Mask>, pixel: usize| mask.map_or(false, |m| m.at_index(pixel));
    achieved
        .data()
        .iter()
        .zip(goal.data().iter())
        .enumerate()
        .map(|(i, (&x, &y))| {
            let pixel = i / 3;
            let mut d = x as f64 - y as f64;
            if is_robot(goal_mask, pixel) {
                d *= weight;
            }
            if is_robot(achieved_mask, pixel) {
                d *= weight;
            }
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn blur(img: &Image, sigma: f64) -> Image {
    Image::from_rgb_image(&imageops::blur(&img.to_rgb_image(), sigma as f32))
}

#[cfg(test)]
mod tests {
    use crate::cost::{aggregate, CostFunction};
    use crate::exception::MpcException;
    use crate::state::{Image, Mask, Observation};
    use nalgebra::DMatrix;

    fn observation(img: Image, mask: Option<Mask>) -> Observation {
        Observation { image: img, mask }
    }

    fn corner_mask() -> Mask {
        let mut mask = Mask::empty(4, 4);
        mask.set(0, 0, true);
        mask
    }

    #[test]
    fn dense_cost_is_pixel_norm() {
        let goal = Image::new(2, 2, [0, 0, 0]);
        let mut img = goal.clone();
        img.set_pixel(1, 1, [3, 4, 0]);
        let cost = CostFunction::Dense;
        let prepared = cost.prepare_goal(&goal, None).unwrap();
        let c = cost.cost(&observation(img, None), &prepared, 0, 1).unwrap();
        assert!((c - 5.).abs() < 1e-12);
    }

    #[test]
    fn sparse_cost_thresholds_distance() {
        let goal = Image::new(2, 2, [0, 0, 0]);
        let mut img = goal.clone();
        img.set_pixel(0, 0, [3, 4, 0]);
        let prepared = CostFunction::Dense.prepare_goal(&goal, None).unwrap();
        let strict = CostFunction::Sparse { threshold: 4.9 };
        let loose = CostFunction::Sparse { threshold: 5.1 };
        let obs = observation(img, None);
        assert_eq!(strict.cost(&obs, &prepared, 0, 1).unwrap(), 1.);
        assert_eq!(loose.cost(&obs, &prepared, 0, 1).unwrap(), 0.);
    }

    #[test]
    fn weighted_cost_scales_robot_pixels() {
        let goal = Image::new(4, 4, [0, 0, 0]);
        let mut img = goal.clone();
        img.set_pixel(0, 0, [10, 0, 0]);
        img.set_pixel(3, 3, [10, 0, 0]);
        let cost = CostFunction::Weighted {
            robot_pixel_weight: 0.,
        };
        let prepared = cost.prepare_goal(&goal, None).unwrap();
        let c = cost
            .cost(&observation(img.clone(), Some(corner_mask())), &prepared, 0, 1)
            .unwrap();
        assert!((c - 10.).abs() < 1e-12);

        let half = CostFunction::Weighted {
            robot_pixel_weight: 0.5,
        };
        let prepared = half.prepare_goal(&goal, Some(&corner_mask())).unwrap();
        let c = half
            .cost(&observation(img, Some(corner_mask())), &prepared, 0, 1)
            .unwrap();
        // robot pixel in goal and observation: 10 * 0.5 * 0.5
        assert!((c - (100f64 + 6.25).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn inpaint_cost_ignores_robot() {
        let background = Image::new(4, 4, [50, 50, 50]);
        let mut goal = background.clone();
        goal.set_pixel(0, 0, [200, 0, 0]);
        let mut img = background.clone();
        img.set_pixel(0, 0, [0, 0, 200]);
        let cost = CostFunction::Inpaint { background };
        let prepared = cost.prepare_goal(&goal, Some(&corner_mask())).unwrap();
        let c = cost
            .cost(&observation(img, Some(corner_mask())), &prepared, 0, 1)
            .unwrap();
        assert_eq!(c, 0.);
    }

    #[test]
    fn black_robot_cost_blackens_robot() {
        let goal = Image::new(4, 4, [50, 50, 50]);
        let mut img = goal.clone();
        img.set_pixel(0, 0, [0, 0, 200]);
        let cost = CostFunction::BlackRobot;
        let prepared = cost.prepare_goal(&goal, Some(&corner_mask())).unwrap();
        assert_eq!(prepared.image().pixel(0, 0), [0, 0, 0]);
        let c = cost
            .cost(&observation(img, Some(corner_mask())), &prepared, 0, 1)
            .unwrap();
        assert_eq!(c, 0.);
    }

    #[test]
    fn inpaint_blur_switches_at_remaining_horizon() {
        let background = Image::new(4, 4, [0, 0, 0]);
        let cost = CostFunction::InpaintBlur {
            background,
            sigma: 1.,
            unblur_cost_scale: 3.,
            unblur_timestep: 1.,
        };
        let horizon = 4;
        assert!(!cost.uses_unblurred_cost(0, horizon));
        assert!(!cost.uses_unblurred_cost(2, horizon));
        assert!(cost.uses_unblurred_cost(3, horizon));
        assert!(!CostFunction::Dense.uses_unblurred_cost(3, horizon));
    }

    #[test]
    fn inpaint_blur_scales_unblurred_cost() {
        let background = Image::new(4, 4, [0, 0, 0]);
        let goal = background.clone();
        let mut img = background.clone();
        img.set_pixel(2, 2, [3, 4, 0]);
        let cost = CostFunction::InpaintBlur {
            background,
            sigma: 1.,
            unblur_cost_scale: 3.,
            unblur_timestep: 1.,
        };
        let prepared = cost.prepare_goal(&goal, None).unwrap();
        let obs = observation(img, None);
        let unblurred = cost.cost(&obs, &prepared, 1, 2).unwrap();
        assert!((unblurred - 15.).abs() < 1e-12);
        let blurred = cost.cost(&obs, &prepared, 0, 2).unwrap();
        assert!(blurred < unblurred);
    }

    #[test]
    fn mismatched_sizes_are_rollout_errors() {
        let goal = Image::new(4, 4, [0, 0, 0]);
        let prepared = CostFunction::Dense.prepare_goal(&goal, None).unwrap();
        let obs = observation(Image::new(2, 2, [0, 0, 0]), None);
        match CostFunction::Dense.cost(&obs, &prepared, 0, 1) {
            Err(MpcException::RolloutException { .. }) => {}
            other => panic!("expected rollout error, found {:?}", other),
        }
    }

    #[test]
    fn masks_of_wrong_size_are_rollout_errors() {
        let background = Image::new(4, 4, [0, 0, 0]);
        let inpaint = CostFunction::Inpaint { background };
        let goal = Image::new(4, 4, [9, 9, 9]);
        match inpaint.prepare_goal(&goal, Some(&Mask::empty(8, 8))) {
            Err(MpcException::RolloutException { .. }) => {}
            other => panic!("expected rollout error, found {:?}", other),
        }

        let weighted = CostFunction::Weighted {
            robot_pixel_weight: 0.5,
        };
        let prepared = weighted.prepare_goal(&goal, Some(&corner_mask())).unwrap();
        let obs = observation(Image::new(4, 4, [0, 0, 0]), Some(Mask::empty(2, 2)));
        match weighted.cost(&obs, &prepared, 0, 1) {
            Err(MpcException::RolloutException { .. }) => {}
            other => panic!("expected rollout error, found {:?}", other),
        }
    }

    #[test]
    fn aggregate_sums_over_horizon() {
        let per_step = DMatrix::from_row_slice(2, 3, &[1., 2., 3., 0.5, 0.5, f64::NAN]);
        let totals = aggregate(&per_step).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0], 6.);
        assert!(totals[1].is_nan());
    }

    #[test]
    fn aggregate_fails_without_finite_cost() {
        let per_step = DMatrix::from_row_slice(2, 2, &[f64::NAN, 1., f64::INFINITY, 0.]);
        match aggregate(&per_step) {
            Err(MpcException::AggregationException { .. }) => {}
            other => panic!("expected aggregation error, found {:?}", other),
        }
    }
}
