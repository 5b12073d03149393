// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the observation types: images, robot masks, states and goals.
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::exception::{create_configuration_exception, MpcException, MpcResult};

/// An 8-bit RGB image stored row-major (height x width x 3).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Image {
    /// Creates an image filled with one color.
    pub fn new(width: usize, height: usize, color: [u8; 3]) -> Image {
        let mut data = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            data.extend_from_slice(&color);
        }
        Image {
            width,
            height,
            data,
        }
    }
    /// Wraps raw row-major RGB bytes.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`) if
    /// the buffer does not contain exactly `width * height * 3` bytes.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> MpcResult<Image> {
        if data.len() != width * height * 3 {
            return Err(create_configuration_exception(format!(
                "image buffer has {} bytes but a {}x{} RGB image needs {}",
                data.len(),
                width,
                height,
                width * height * 3
            )));
        }
        Ok(Image {
            width,
            height,
            data,
        })
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
    pub fn set_pixel(&mut self, x: usize, y: usize, color: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&color);
    }
    /// Replaces every pixel covered by the mask with the corresponding pixel of `source`.
    pub fn fill_masked_from(&mut self, mask: &Mask, source: &Image) {
        for (pixel, _) in mask.data.iter().enumerate().filter(|(_, robot)| **robot) {
            let i = pixel * 3;
            self.data[i..i + 3].copy_from_slice(&source.data[i..i + 3]);
        }
    }
    /// Sets every pixel covered by the mask to `color`.
    pub fn fill_masked(&mut self, mask: &Mask, color: [u8; 3]) {
        for (pixel, _) in mask.data.iter().enumerate().filter(|(_, robot)| **robot) {
            let i = pixel * 3;
            self.data[i..i + 3].copy_from_slice(&color);
        }
    }
    /// Places `other` to the right of this image. Both images need the same height.
    pub fn concat_horizontal(&self, other: &Image) -> MpcResult<Image> {
        if self.height != other.height {
            return Err(create_configuration_exception(format!(
                "cannot concatenate images of height {} and {}",
                self.height, other.height
            )));
        }
        let width = self.width + other.width;
        let mut data = Vec::with_capacity(width * self.height * 3);
        for row in 0..self.height {
            data.extend_from_slice(&self.data[row * self.width * 3..(row + 1) * self.width * 3]);
            data.extend_from_slice(
                &other.data[row * other.width * 3..(row + 1) * other.width * 3],
            );
        }
        Ok(Image {
            width,
            height: self.height,
            data,
        })
    }
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Rgb(self.pixel(x as usize, y as usize))
        })
    }
    pub fn from_rgb_image(img: &RgbImage) -> Image {
        Image {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().clone(),
        }
    }
}

/// A binary mask over an image where `true` marks pixels occupied by the robot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Mask {
    /// Creates a mask without any robot pixels.
    pub fn empty(width: usize, height: usize) -> Mask {
        Mask {
            width,
            height,
            data: vec![false; width * height],
        }
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }
    pub fn set(&mut self, x: usize, y: usize, robot: bool) {
        self.data[y * self.width + x] = robot;
    }
    /// Whether the pixel with the given row-major index belongs to the robot.
    pub fn at_index(&self, index: usize) -> bool {
        self.data[index]
    }
    /// Whether the mask has the size of `image`.
    pub fn fits(&self, image: &Image) -> bool {
        self.width == image.width() && self.height == image.height()
    }
    /// number of robot pixels
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&robot| robot).count()
    }
}

/// What a simulator step or a dynamics-model prediction yields for one time step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Observation {
    pub image: Image,
    /// robot pixels of `image`, if known
    pub mask: Option<Mask>,
}

/// Snapshot of the world at one instant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct State {
    /// camera image
    pub image: Image,
    /// end-effector position (and orientation parameters if available)
    pub end_effector: Vec<f64>,
    /// measured joint positions
    pub joint_positions: Vec<f64>,
    /// robot pixels of `image`, if known
    pub mask: Option<Mask>,
    /// flattened simulator state. Needed by ground-truth rollouts and by models conditioned on it.
    pub sim_state: Option<Vec<f64>>,
}

/// One or more goal images (and optional robot masks) candidate rollouts are scored against.
///
/// The goal at time step `t` is `imgs[min(t, len - 1)]`. A goal always holds at least one image
/// and one mask entry per image, also when it is deserialized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawGoalState")]
pub struct GoalState {
    imgs: Vec<Image>,
    masks: Vec<Option<Mask>>,
    sim_state: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawGoalState {
    imgs: Vec<Image>,
    masks: Vec<Option<Mask>>,
    sim_state: Option<Vec<f64>>,
}

impl TryFrom<RawGoalState> for GoalState {
    type Error = MpcException;

    fn try_from(raw: RawGoalState) -> MpcResult<GoalState> {
        let mut goal = GoalState::new(raw.imgs, raw.masks)?;
        goal.sim_state = raw.sim_state;
        Ok(goal)
    }
}

impl GoalState {
    /// Creates a goal sequence.
    /// # Errors
    /// * [`ConfigurationException`](`crate::exception::MpcException::ConfigurationException`) if
    /// no goal image is given, the number of masks does not match the number of images or a
    /// mask does not cover its image.
    pub fn new(imgs: Vec<Image>, masks: Vec<Option<Mask>>) -> MpcResult<GoalState> {
        if imgs.is_empty() {
            return Err(create_configuration_exception(
                "a goal needs at least one image",
            ));
        }
        if imgs.len() != masks.len() {
            return Err(create_configuration_exception(format!(
                "got {} goal images but {} masks",
                imgs.len(),
                masks.len()
            )));
        }
        for (index, (img, mask)) in imgs.iter().zip(masks.iter()).enumerate() {
            if let Some(mask) = mask {
                if !mask.fits(img) {
                    return Err(create_configuration_exception(format!(
                        "goal mask {} is {}x{} but its image is {}x{}",
                        index,
                        mask.width(),
                        mask.height(),
                        img.width(),
                        img.height()
                    )));
                }
            }
        }
        Ok(GoalState {
            imgs,
            masks,
            sim_state: None,
        })
    }
    /// Creates a goal consisting of a single final image.
    /// # Errors
    /// See [`new`](`Self::new`).
    pub fn single(img: Image, mask: Option<Mask>) -> MpcResult<GoalState> {
        GoalState::new(vec![img], vec![mask])
    }
    /// Attaches the simulator state the final goal image shows.
    pub fn with_sim_state(mut self, sim_state: Vec<f64>) -> GoalState {
        self.sim_state = Some(sim_state);
        self
    }
    pub fn len(&self) -> usize {
        self.imgs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.imgs.is_empty()
    }
    pub fn imgs(&self) -> &[Image] {
        &self.imgs
    }
    pub fn masks(&self) -> &[Option<Mask>] {
        &self.masks
    }
    /// The last goal image, which every step beyond the goal sequence is compared with.
    pub fn final_img(&self) -> &Image {
        &self.imgs[self.index_for_step(usize::MAX)]
    }
    /// Simulator state of the final goal, if the goal was created in a simulation.
    pub fn sim_state(&self) -> Option<&[f64]> {
        self.sim_state.as_deref()
    }
    /// Index of the goal frame used at time step `step`. Clamps to the last goal frame.
    pub fn index_for_step(&self, step: usize) -> usize {
        goal_index(step, self.imgs.len())
    }
}

/// Index of the goal used at `step` for a goal sequence of length `goal_len`.
pub fn goal_index(step: usize, goal_len: usize) -> usize {
    usize::min(step, goal_len.saturating_sub(1))
}

/// A previously captured start and goal configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartGoal {
    pub start: State,
    pub goal: GoalState,
}

impl StartGoal {
    /// Stores the pair at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> MpcResult<()> {
        let file = File::create(path.as_ref()).map_err(|e| MpcException::PersistenceException {
            message: format!("could not create {:?}: {}", path.as_ref(), e),
        })?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|e| {
            MpcException::PersistenceException {
                message: format!("could not write start/goal pair: {}", e),
            }
        })
    }
    /// Loads a pair stored with [`save`](`Self::save`).
    pub fn load<P: AsRef<Path>>(path: P) -> MpcResult<StartGoal> {
        let file = File::open(path.as_ref()).map_err(|e| MpcException::PersistenceException {
            message: format!("could not open {:?}: {}", path.as_ref(), e),
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| {
            MpcException::PersistenceException {
                message: format!("could not read start/goal pair: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::path::PathBuf;

    use crate::exception::MpcException;
    use crate::state::{goal_index, GoalState, Image, Mask, StartGoal, State};

    fn checker(width: usize, height: usize) -> Image {
        let mut img = Image::new(width, height, [0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                if (x + y) % 2 == 0 {
                    img.set_pixel(x, y, [255, 255, 255]);
                }
            }
        }
        img
    }

    #[test]
    fn goal_index_clamps_to_last_frame() {
        assert_eq!(goal_index(0, 2), 0);
        assert_eq!(goal_index(1, 2), 1);
        for step in 2..5 {
            assert_eq!(goal_index(step, 2), 1);
        }
        assert_eq!(goal_index(7, 1), 0);
    }

    #[test]
    fn empty_goal_is_rejected() {
        match GoalState::new(vec![], vec![]) {
            Err(MpcException::ConfigurationException { .. }) => {}
            other => panic!("expected configuration error, found {:?}", other),
        }
        let img = Image::new(2, 2, [0, 0, 0]);
        assert!(GoalState::new(vec![img], vec![]).is_err());
    }

    #[test]
    fn raw_image_size_is_checked() {
        assert!(Image::from_raw(2, 2, vec![0; 12]).is_ok());
        assert!(Image::from_raw(2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn masked_pixels_are_replaced() {
        let mut img = Image::new(3, 2, [10, 10, 10]);
        let background = checker(3, 2);
        let mut mask = Mask::empty(3, 2);
        mask.set(0, 0, true);
        mask.set(2, 1, true);
        img.fill_masked_from(&mask, &background);
        assert_eq!(img.pixel(0, 0), [255, 255, 255]);
        assert_eq!(img.pixel(2, 1), [0, 0, 0]);
        assert_eq!(img.pixel(1, 0), [10, 10, 10]);
        img.fill_masked(&mask, [1, 2, 3]);
        assert_eq!(img.pixel(0, 0), [1, 2, 3]);
        assert_eq!(mask.count(), 2);
    }

    #[test]
    fn horizontal_concatenation() {
        let left = Image::new(2, 3, [1, 1, 1]);
        let right = checker(4, 3);
        let both = left.concat_horizontal(&right).unwrap();
        assert_eq!(both.width(), 6);
        assert_eq!(both.height(), 3);
        assert_eq!(both.pixel(1, 2), [1, 1, 1]);
        assert_eq!(both.pixel(2, 0), right.pixel(0, 0));
        assert_eq!(both.pixel(5, 2), right.pixel(3, 2));
        assert!(left.concat_horizontal(&Image::new(2, 2, [0, 0, 0])).is_err());
    }

    #[test]
    fn start_goal_can_be_saved_and_loaded() {
        let start = State {
            image: checker(4, 4),
            end_effector: vec![0.3, 0.1, 0.12],
            joint_positions: vec![0.; 7],
            mask: Some(Mask::empty(4, 4)),
            sim_state: Some(vec![0.1, 0.2, 0.3, 0.4]),
        };
        let goal = GoalState::single(Image::new(4, 4, [9, 9, 9]), None)
            .unwrap()
            .with_sim_state(vec![0.5, 0.1, 0.6, 0.]);
        let pair = StartGoal { start, goal };
        let path = std::env::temp_dir().join(format!("start_goal_{}.bin", std::process::id()));
        pair.save(&path).unwrap();
        let loaded = StartGoal::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(pair, loaded);
    }

    fn write_raw_start_goal(name: &str, imgs: Vec<Image>, masks: Vec<Option<Mask>>) -> PathBuf {
        let start = State {
            image: Image::new(2, 2, [0, 0, 0]),
            end_effector: vec![0.; 3],
            joint_positions: vec![0.; 7],
            mask: None,
            sim_state: None,
        };
        let path = std::env::temp_dir().join(format!("{}_{}.bin", name, std::process::id()));
        let file = File::create(&path).unwrap();
        bincode::serialize_into(file, &(start, (imgs, masks, Option::<Vec<f64>>::None))).unwrap();
        path
    }

    #[test]
    fn start_goal_with_empty_goal_is_rejected() {
        let path = write_raw_start_goal("empty_goal", Vec::new(), Vec::new());
        let loaded = StartGoal::load(&path);
        std::fs::remove_file(&path).unwrap();
        match loaded {
            Err(MpcException::PersistenceException { .. }) => {}
            other => panic!("expected persistence error, found {:?}", other),
        }
    }

    #[test]
    fn start_goal_with_missing_masks_is_rejected() {
        let imgs = vec![Image::new(2, 2, [1, 1, 1]), Image::new(2, 2, [2, 2, 2])];
        let path = write_raw_start_goal("missing_masks", imgs, vec![None]);
        let loaded = StartGoal::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(loaded.is_err());

        let imgs = vec![Image::new(2, 2, [1, 1, 1])];
        let path = write_raw_start_goal("oversized_mask", imgs, vec![Some(Mask::empty(8, 8))]);
        let loaded = StartGoal::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(loaded.is_err());
    }

    #[test]
    fn goal_masks_must_cover_their_image() {
        let img = Image::new(4, 4, [0, 0, 0]);
        match GoalState::single(img.clone(), Some(Mask::empty(8, 8))) {
            Err(MpcException::ConfigurationException { .. }) => {}
            other => panic!("expected configuration error, found {:?}", other),
        }
        let masks = vec![None, Some(Mask::empty(4, 2))];
        assert!(GoalState::new(vec![img.clone(), img.clone()], masks).is_err());
        let goal = GoalState::single(img, Some(Mask::empty(4, 4))).unwrap();
        assert_eq!(goal.final_img().width(), 4);
        assert!(goal.sim_state().is_none());
    }

    #[test]
    fn loading_missing_start_goal_fails() {
        match StartGoal::load("/nonexistent/start_goal.bin") {
            Err(MpcException::PersistenceException { .. }) => {}
            other => panic!("expected persistence error, found {:?}", other),
        }
    }
}
