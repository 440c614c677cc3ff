//! Built-in activities.
//!
//! Each module owns its CodeInfo record, the matchers that fill it, its hint
//! catalog and its scorer.

pub mod cafe;
pub mod fruit;
pub mod nmt;
pub mod planes;
pub mod wine;

pub use cafe::{CafeActivity, CafeClassifier, CafeCodeInfo, evaluate_cafe_experiment};
pub use fruit::{FruitClassifier, FruitCodeInfo, FruitPickerActivity, evaluate_fruit_experiment};
pub use nmt::{NmtActivity, NmtCodeInfo, evaluate_nmt_experiment};
pub use planes::{ModelSize, PlanesActivity, PlanesCodeInfo, evaluate_planes_experiment};
pub use wine::{WineActivity, WineCodeInfo, evaluate_wine_experiment};

use crate::hints::{Visibility, VisibilityCondition, visibility};

pub(crate) fn on_button() -> Visibility {
    visibility(&[VisibilityCondition::HintButtonClicked])
}

pub(crate) fn on_button_or_return() -> Visibility {
    visibility(&[
        VisibilityCondition::HintButtonClicked,
        VisibilityCondition::TriggeredOnNotebookReturn,
    ])
}

pub(crate) fn while_active() -> Visibility {
    visibility(&[
        VisibilityCondition::HintButtonClicked,
        VisibilityCondition::TriggeredOnNotebookReturn,
        VisibilityCondition::MustBeActive,
    ])
}
