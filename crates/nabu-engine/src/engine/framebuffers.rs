use crate::gfx::Graphics;

/// Two equally sized offscreen targets that alternate as read source and
/// draw target between passes.
#[derive(Debug)]
pub(crate) struct PingPong<T> {
    pub ping: T,
    pub pong: T,
    pub width: u32,
    pub height: u32,
}

impl<T: Copy + Eq> PingPong<T> {
    /// Allocates both targets, or neither.
    pub fn allocate<G>(gl: &mut G, width: u32, height: u32) -> Option<Self>
    where
        G: Graphics<Target = T>,
    {
        let ping = gl.create_target(width, height)?;
        let Some(pong) = gl.create_target(width, height) else {
            gl.delete_target(ping);
            return None;
        };
        Some(Self {
            ping,
            pong,
            width,
            height,
        })
    }

    pub fn release<G>(self, gl: &mut G)
    where
        G: Graphics<Target = T>,
    {
        gl.delete_target(self.ping);
        gl.delete_target(self.pong);
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}
