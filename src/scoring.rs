use image::RgbImage;
use serde::Serialize;

/// Score assigned to a frame, along with the label of the bucket it competes in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score {
    pub label: &'static str,
    pub value: f64,
}

pub trait Scorer {
    fn score(&self, frame: &RgbImage) -> Score;
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn score(&self, frame: &RgbImage) -> Score {
        (**self).score(frame)
    }
}

/// Sum of the blue channel over every pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlueIntensity;

impl Scorer for BlueIntensity {
    fn score(&self, frame: &RgbImage) -> Score {
        let sum: u64 = frame.pixels().map(|p| u64::from(p[2])).sum();
        Score {
            label: "blue_frame",
            value: sum as f64,
        }
    }
}

/// Share of pixels per colour range, in percent of the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ColourShares {
    pub blue: f64,
    pub green: f64,
    pub brown: f64,
    pub black: f64,
    pub yellow: f64,
}

impl ColourShares {
    pub fn measure(frame: &RgbImage) -> Self {
        let mut counts = [0u64; 5];
        for p in frame.pixels() {
            let [r, g, b] = p.0;
            let bucket = if b > 100 && b < 140 && g > 50 && r < 140 {
                0
            } else if g > 35 && g < 85 && r < 85 {
                1
            } else if r > 10 && r < 20 {
                2
            } else if r < 50 && g < 50 && b < 50 {
                3
            } else if r > 20 && r < 30 {
                4
            } else {
                continue;
            };
            counts[bucket] += 1;
        }
        let total = f64::from(frame.width()) * f64::from(frame.height());
        let pct = |n: u64| n as f64 / total * 100.0;
        Self {
            blue: pct(counts[0]),
            green: pct(counts[1]),
            brown: pct(counts[2]),
            black: pct(counts[3]),
            yellow: pct(counts[4]),
        }
    }

    pub fn daylight(&self) -> f64 {
        self.blue + self.green + self.brown
    }

    pub fn darkness(&self) -> f64 {
        self.black + self.yellow
    }

    pub fn is_day(&self) -> bool {
        self.daylight() > self.darkness()
    }
}

/// Splits frames into day and night and scores each by how strongly it
/// shows the colours typical of its half.
///
/// An empty frame scores NaN.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clarity;

impl Scorer for Clarity {
    fn score(&self, frame: &RgbImage) -> Score {
        let shares = ColourShares::measure(frame);
        if shares.is_day() {
            Score {
                label: "day_image",
                value: shares.daylight(),
            }
        } else {
            Score {
                label: "night_image",
                value: shares.darkness(),
            }
        }
    }
}
