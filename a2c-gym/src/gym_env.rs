use crate::{EnvBuilderTrait, PixelEnv, PixelStep, frames::RgbFrame};
use anyhow::{Context, Result, bail};
use pyo3::{
    Bound, PyAny, PyObject, Python,
    types::{PyAnyMethods, PyBytes, PyBytesMethods, PyDict},
};
use tracing::debug;

const HUMAN_RENDER_MODE: &str = "human";

fn extract_frame(observation: &Bound<'_, PyAny>) -> Result<RgbFrame> {
    let shape: Vec<usize> = observation.getattr("shape")?.extract()?;
    let [height, width, 3] = shape[..] else {
        bail!("expected an (H, W, 3) RGB observation, got shape {shape:?}");
    };
    let bytes = observation
        .call_method1("astype", ("uint8",))?
        .call_method0("tobytes")?;
    let pixels = bytes.downcast::<PyBytes>().map_err(pyo3::PyErr::from)?;
    RgbFrame::new(pixels.as_bytes().to_vec(), height, width)
}

/// A gymnasium environment with pixel observations, driven through the embedded interpreter.
pub struct GymEnv {
    env: PyObject,
    name: String,
    n_actions: usize,
    render_mode: Option<String>,
}

impl GymEnv {
    pub fn new(name: &str, render_mode: Option<String>) -> Result<GymEnv> {
        Python::with_gil(|py| {
            let gym = py.import("gymnasium")?;
            // Atari environments are registered by ale_py on import, newer gymnasium versions
            // want the module passed to register_envs as well
            match py.import("ale_py") {
                Ok(ale_py) => {
                    if let Err(err) = gym.call_method1("register_envs", (ale_py,)) {
                        debug!("gymnasium.register_envs failed: {err}");
                    }
                }
                Err(err) => debug!("ale_py is not importable: {err}"),
            }
            let kwargs = PyDict::new(py);
            if let Some(render_mode) = &render_mode {
                kwargs.set_item("render_mode", render_mode)?;
            }
            let make = gym.getattr("make")?;
            let env = make.call((name,), Some(&kwargs))?;
            let action_space = env.getattr("action_space")?;
            let gym_spaces = py.import("gymnasium.spaces")?;
            if !action_space.is_instance(&gym_spaces.getattr("Discrete")?)? {
                bail!("{name} does not have a discrete action space");
            }
            let n_actions = action_space.getattr("n")?.extract()?;
            anyhow::Ok(GymEnv {
                env: env.into(),
                name: name.to_owned(),
                n_actions,
                render_mode,
            })
        })
        .with_context(|| format!("creating gymnasium environment {name}"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PixelEnv for GymEnv {
    fn reset(&mut self, seed: u64) -> Result<RgbFrame> {
        Python::with_gil(|py| {
            let kwargs = PyDict::new(py);
            kwargs.set_item("seed", seed)?;
            let reset = self.env.call_method(py, "reset", (), Some(&kwargs))?;
            let observation = reset.bind(py).get_item(0)?;
            extract_frame(&observation)
        })
        .with_context(|| format!("resetting {}", self.name))
    }

    fn step(&mut self, action: usize) -> Result<PixelStep> {
        Python::with_gil(|py| {
            let step = self.env.call_method(py, "step", (action,), None)?;
            let step = step.bind(py);
            let frame = extract_frame(&step.get_item(0)?)?;
            let reward: f32 = step.get_item(1)?.extract()?;
            let terminated: bool = step.get_item(2)?.extract()?;
            let trancuated: bool = step.get_item(3)?.extract()?;
            anyhow::Ok(PixelStep {
                frame,
                reward,
                terminated,
                trancuated,
            })
        })
        .with_context(|| format!("stepping {} with action {action}", self.name))
    }

    fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn render(&mut self) -> Result<()> {
        // human mode draws a window on every step by itself
        if self.render_mode.as_deref() == Some(HUMAN_RENDER_MODE) {
            return Ok(());
        }
        Python::with_gil(|py| self.env.call_method0(py, "render"))
            .with_context(|| format!("rendering {}", self.name))?;
        Ok(())
    }
}

pub struct GymEnvBuilder {
    name: String,
    render: bool,
}

impl GymEnvBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            render: false,
        }
    }

    /// Opens a window showing the game while training.
    pub fn render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }
}

impl From<&str> for GymEnvBuilder {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl EnvBuilderTrait for GymEnvBuilder {
    type Env = GymEnv;

    fn build_env(&self) -> Result<Self::Env> {
        let render_mode = self.render.then(|| HUMAN_RENDER_MODE.to_owned());
        GymEnv::new(&self.name, render_mode)
    }
}
