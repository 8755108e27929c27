use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;

fn main() -> anyhow::Result<()> {
    // Dark table with a slightly tilted white card
    let mut img = RgbImage::from_pixel(800, 600, Rgb([45, 40, 38]));
    let card = [
        Point::new(230, 110),
        Point::new(560, 140),
        Point::new(540, 500),
        Point::new(210, 470),
    ];
    draw_polygon_mut(&mut img, &card, Rgb([240, 238, 232]));

    // A thick "7" in the middle of the card
    draw_filled_rect_mut(&mut img, Rect::at(310, 200).of_size(170, 30), Rgb([20, 20, 25]));
    let stem = [
        Point::new(450, 230),
        Point::new(480, 230),
        Point::new(390, 420),
        Point::new(360, 420),
    ];
    draw_polygon_mut(&mut img, &stem, Rgb([20, 20, 25]));

    img.save("test_card.png")?;
    println!("Created test_card.png (800x600 card with a handwritten 7)");
    Ok(())
}
