use eframe::egui;
use egui::{Color32, CornerRadius, Stroke, Visuals};

/// Colors for the two reading modes. Indigo is the BookAtlas brand color.
pub struct AppTheme {
    pub dark: bool,
    pub background: Color32,
    pub card_background: Color32,
    pub text: Color32,
    pub secondary_text: Color32,
    pub highlight: Color32,
    pub accent: Color32,
    pub separator: Color32,
    pub error: Color32,
    pub success: Color32,
    pub button_background: Color32,
    pub button_foreground: Color32,
}

impl AppTheme {
    pub fn dark() -> Self {
        Self {
            dark: true,
            background: Color32::from_rgb(17, 18, 23),
            card_background: Color32::from_rgb(28, 30, 38),
            text: Color32::from_rgb(236, 237, 243),
            secondary_text: Color32::from_rgb(160, 164, 180),
            highlight: Color32::from_rgb(99, 102, 241),
            accent: Color32::from_rgb(165, 180, 252),
            separator: Color32::from_rgb(52, 55, 68),
            error: Color32::from_rgb(248, 113, 113),
            success: Color32::from_rgb(74, 222, 128),
            button_background: Color32::from_rgb(44, 47, 60),
            button_foreground: Color32::from_rgb(236, 237, 243),
        }
    }

    pub fn light() -> Self {
        Self {
            dark: false,
            background: Color32::from_rgb(248, 248, 252),
            card_background: Color32::WHITE,
            text: Color32::from_rgb(24, 24, 32),
            secondary_text: Color32::from_rgb(96, 98, 112),
            highlight: Color32::from_rgb(79, 70, 229),
            accent: Color32::from_rgb(67, 56, 202),
            separator: Color32::from_rgb(220, 221, 230),
            error: Color32::from_rgb(185, 28, 28),
            success: Color32::from_rgb(21, 128, 61),
            button_background: Color32::from_rgb(234, 235, 243),
            button_foreground: Color32::from_rgb(24, 24, 32),
        }
    }

    pub fn for_mode(is_dark_mode: bool) -> Self {
        if is_dark_mode {
            Self::dark()
        } else {
            Self::light()
        }
    }

    /// egui visuals for this palette, starting from egui's own dark or light set.
    pub fn visuals(&self) -> Visuals {
        let mut visuals = if self.dark { Visuals::dark() } else { Visuals::light() };

        visuals.panel_fill = self.background;
        visuals.window_fill = self.card_background;
        visuals.extreme_bg_color = self.card_background;
        visuals.faint_bg_color = self.button_background.gamma_multiply(0.5);
        visuals.hyperlink_color = self.accent;
        visuals.error_fg_color = self.error;
        visuals.selection.bg_fill = self.highlight;
        visuals.selection.stroke = Stroke::new(1.0, self.text);

        let widgets = &mut visuals.widgets;
        widgets.noninteractive.bg_stroke = Stroke::new(1.0, self.separator);
        widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text);
        widgets.inactive.weak_bg_fill = self.button_background;
        widgets.inactive.fg_stroke = Stroke::new(1.0, self.button_foreground);
        widgets.hovered.bg_stroke = Stroke::new(1.0, self.highlight);
        widgets.active.weak_bg_fill = self.highlight;

        for state in [
            &mut widgets.noninteractive,
            &mut widgets.inactive,
            &mut widgets.hovered,
            &mut widgets.active,
        ] {
            state.corner_radius = CornerRadius::same(6);
        }
        visuals.window_corner_radius = CornerRadius::same(10);

        visuals
    }

    pub fn apply_to_ctx(&self, ctx: &egui::Context) {
        ctx.set_visuals(self.visuals());
        ctx.style_mut(|style| {
            style.spacing.item_spacing = egui::vec2(8.0, 6.0);
            style.spacing.button_padding = egui::vec2(10.0, 4.0);
        });
    }
}
