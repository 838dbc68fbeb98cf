//! SDL2 display surface for decoded frames.

use sdl2::EventPump;
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};
use vtransport::video::{RawImage, VideoDisplay};
use vtransport::{Error, Result};

pub struct SdlDisplay {
    canvas: Canvas<Window>,
    texture: Texture,
    event_pump: EventPump,

    // The texture above must not outlive its creator.
    _texture_creator: TextureCreator<WindowContext>,
    _sdl: sdl2::Sdl,
}

impl SdlDisplay {
    pub fn new(width: u16, height: u16) -> Result<Self> {
        let sdl = sdl2::init().map_err(Error::Display)?;
        let video = sdl.video().map_err(Error::Display)?;

        let window = video
            .window("receiver", u32::from(width), u32::from(height))
            .position_centered()
            .build()
            .map_err(|e| Error::Display(e.to_string()))?;
        let canvas = window
            .into_canvas()
            .build()
            .map_err(|e| Error::Display(e.to_string()))?;
        let texture_creator = canvas.texture_creator();
        let texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::IYUV, u32::from(width), u32::from(height))
            .map_err(|e| Error::Display(e.to_string()))?;
        let event_pump = sdl.event_pump().map_err(Error::Display)?;

        Ok(Self {
            canvas,
            texture,
            event_pump,
            _texture_creator: texture_creator,
            _sdl: sdl,
        })
    }
}

impl VideoDisplay for SdlDisplay {
    fn show_frame(&mut self, image: &RawImage) -> Result<()> {
        self.texture
            .update_yuv(
                None,
                image.y(),
                usize::from(image.width()),
                image.u(),
                image.chroma_width(),
                image.v(),
                image.chroma_width(),
            )
            .map_err(|e| Error::Display(e.to_string()))?;

        self.canvas.clear();
        self.canvas
            .copy(&self.texture, None, None)
            .map_err(Error::Display)?;
        self.canvas.present();
        Ok(())
    }

    fn signal_quit(&mut self) -> bool {
        self.event_pump
            .poll_iter()
            .any(|event| matches!(event, Event::Quit { .. }))
    }
}
