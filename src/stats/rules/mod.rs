// Public API
pub use around_the_clock::{AroundTheClockRule, AroundTheClockStatistics};
pub use around_the_world::{AroundTheWorldRule, AroundTheWorldStatistics};
pub use bermuda_triangle::{BermudaTarget, BermudaTriangleRule, BermudaTriangleStatistics};
pub use cricket::{CricketRule, CricketStatistics, CRICKET_NUMBERS};
pub use darts_at_x::{DartsAtXRule, DartsAtXStatistics};
pub use four_twenty::{FourTwentyRule, FourTwentyStatistics};
pub use gotcha::{GotchaRule, GotchaStatistics};
pub use jdc_practice::{JdcPracticeRule, JdcPracticeStatistics, JdcRound};
pub use kill_bull::{KillBullRule, KillBullStatistics};
pub use knockout::{knocked_out, KnockoutRule, KnockoutStatistics};
pub use scam::{ScamRule, ScamStatistics};
pub use shootout::{ShootoutRule, ShootoutStatistics};
pub use tic_tac_toe::{TicTacToeRule, TicTacToeStatistics};
pub use x01::{X01Rule, X01Statistics};

// Internal modules
mod around_the_clock;
mod around_the_world;
mod bermuda_triangle;
mod cricket;
mod darts_at_x;
mod four_twenty;
mod gotcha;
mod jdc_practice;
mod kill_bull;
mod knockout;
mod scam;
mod shootout;
mod tic_tac_toe;
mod x01;
