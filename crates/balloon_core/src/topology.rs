//! Arc graph of a stacked balloon: arcs, labelled vertices, chambers and the state layout.
//!
//! The stack is described as data so that every equation family can be generated by walking
//! the graph. Level 0 is the top chamber, hung between the anchors A and B. Every level above
//! the bottom one is bounded by three free arcs (first, middle, last) that run clockwise from
//! the left joint of the level above to its right joint. The bottom level is closed by two arcs
//! meeting at a pole that sits straight below their common center.

use serde::{Deserialize, Serialize};

use crate::error::{SolveError, SolveResult};

/// Region whose pressure acts on one side of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureDomain {
    /// Surrounding air on the left of the stack.
    Ambient,
    /// Contact pressure acting on the right-hand outer membranes.
    Contact,
    /// Pressurized chamber, indexed top to bottom.
    Chamber(usize),
}

/// How an arc's angular position is parametrized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcKind {
    /// Own center and start angle: θ(s) = α + sφ.
    Free,
    /// Starts at the bottom pole: θ(s) = 3π/2 + sφ.
    PoleStart,
    /// Ends at the bottom pole: θ(s) = 3π/2 + (s − 1)φ.
    PoleEnd,
}

/// Which end of an arc, in its clockwise running direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcEnd {
    Start,
    End,
}

impl ArcEnd {
    /// Arc parameter `s` of this end.
    pub fn parameter(self) -> f64 {
        match self {
            ArcEnd::Start => 0.0,
            ArcEnd::End => 1.0,
        }
    }

    /// Orientation of the membrane tension pulling on a vertex from this end.
    pub fn tension_sign(self) -> f64 {
        match self {
            ArcEnd::Start => 1.0,
            ArcEnd::End => -1.0,
        }
    }
}

/// Indices of an arc's unknowns inside the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcVariables {
    pub sweep: usize,
    pub radius: usize,
    pub center_x: usize,
    pub center_y: usize,
    /// Present for free arcs only; pole arcs are pinned to 3π/2.
    pub start_angle: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub name: String,
    pub level: usize,
    pub kind: ArcKind,
    pub inner: PressureDomain,
    pub outer: PressureDomain,
    pub vars: ArcVariables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcEndRef {
    pub arc: usize,
    pub end: ArcEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexKind {
    /// Fixed in space; a single arc end is pinned to it.
    Anchor(Anchor),
    /// Three arcs meet and must balance in x and y.
    Joint,
    /// The bottom pole; only the vertical coordinate and the scalar tension balance are free.
    Pole,
}

/// Labelled vertex. The first entry of `ends` is the reference the others are matched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub label: String,
    pub kind: VertexKind,
    pub ends: Vec<ArcEndRef>,
}

/// One arc on a chamber boundary, traversed in its own direction or reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySegment {
    pub arc: usize,
    pub forward: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chamber {
    pub name: String,
    pub boundary: Vec<BoundarySegment>,
    /// The boundary does not return to its start; the anchor chord closes it.
    pub open: bool,
    pub pressure: usize,
}

/// Arc indices of a level above the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelArcs {
    pub first: usize,
    pub middle: usize,
    pub last: usize,
}

/// Arc indices of the bottom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottomArcs {
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub arcs: Vec<Arc>,
    pub vertices: Vec<Vertex>,
    pub chambers: Vec<Chamber>,
    pub levels: Vec<LevelArcs>,
    pub bottom: BottomArcs,
    /// Arcs whose lengths are conserved together (the two pole arcs form one group).
    pub length_groups: Vec<Vec<usize>>,
    /// Shared center-x of the bottom level.
    pub bottom_offset: usize,
    pub dimension: usize,
}

fn vertex_label(index: usize) -> String {
    let mut label = String::new();
    let mut n = index;
    loop {
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label
}

fn chamber_name(index: usize, count: usize) -> String {
    match (index, count) {
        (0, _) => "top".to_string(),
        (i, n) if i + 1 == n => "bottom".to_string(),
        (1, 3) => "middle".to_string(),
        (i, _) => format!("level-{i}"),
    }
}

struct LayoutCursor {
    next: usize,
}

impl LayoutCursor {
    fn take(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        index
    }
}

impl Topology {
    /// Builds the arc graph of a stack with `chambers` pressurized levels (at least two).
    pub fn stacked(chambers: usize) -> SolveResult<Self> {
        if chambers < 2 {
            return Err(SolveError::Configuration(format!(
                "A stack needs at least two chambers, got {chambers}."
            )));
        }
        let upper = chambers - 1;

        // Joint labels: level i has its right joint at 2 + 2i and its left one at 3 + 2i.
        let right_label = |level: usize| vertex_label(2 + 2 * level);
        let left_label = |level: usize| vertex_label(3 + 2 * level);
        let pole_label = vertex_label(2 + 2 * upper);
        let entry_labels = |level: usize| {
            if level == 0 {
                (vertex_label(0), vertex_label(1))
            } else {
                (left_label(level - 1), right_label(level - 1))
            }
        };

        let mut cursor = LayoutCursor { next: 0 };
        let mut arcs = Vec::with_capacity(3 * upper + 2);
        let free_arc = |cursor: &mut LayoutCursor,
                            arcs: &mut Vec<Arc>,
                            name: String,
                            level: usize,
                            outer: PressureDomain| {
            let vars = ArcVariables {
                sweep: cursor.take(),
                radius: cursor.take(),
                center_x: cursor.take(),
                center_y: cursor.take(),
                start_angle: Some(cursor.take()),
            };
            arcs.push(Arc {
                name,
                level,
                kind: ArcKind::Free,
                inner: PressureDomain::Chamber(level),
                outer,
                vars,
            });
            arcs.len() - 1
        };

        let mut levels = Vec::with_capacity(upper);
        for level in 0..upper {
            let (entry_left, entry_right) = entry_labels(level);
            let left = left_label(level);
            let right = right_label(level);
            let first = free_arc(
                &mut cursor,
                &mut arcs,
                format!("{entry_left}{left}"),
                level,
                PressureDomain::Ambient,
            );
            let last = free_arc(
                &mut cursor,
                &mut arcs,
                format!("{right}{entry_right}"),
                level,
                PressureDomain::Contact,
            );
            let middle = free_arc(
                &mut cursor,
                &mut arcs,
                format!("{left}{right}"),
                level,
                PressureDomain::Chamber(level + 1),
            );
            levels.push(LevelArcs {
                first,
                middle,
                last,
            });
        }

        // Pole arcs share the bottom offset as center-x; it is placed after them.
        let bottom_level = upper;
        let mut pole_arc = |cursor: &mut LayoutCursor, name: String, kind, outer| {
            let sweep = cursor.take();
            let radius = cursor.take();
            let center_y = cursor.take();
            arcs.push(Arc {
                name,
                level: bottom_level,
                kind,
                inner: PressureDomain::Chamber(bottom_level),
                outer,
                vars: ArcVariables {
                    sweep,
                    radius,
                    center_x: usize::MAX,
                    center_y,
                    start_angle: None,
                },
            });
            arcs.len() - 1
        };
        let left = pole_arc(
            &mut cursor,
            format!("{pole_label}{}", left_label(upper - 1)),
            ArcKind::PoleEnd,
            PressureDomain::Ambient,
        );
        let right = pole_arc(
            &mut cursor,
            format!("{pole_label}{}", right_label(upper - 1)),
            ArcKind::PoleStart,
            PressureDomain::Contact,
        );
        let bottom = BottomArcs { left, right };
        let bottom_offset = cursor.take();
        arcs[left].vars.center_x = bottom_offset;
        arcs[right].vars.center_x = bottom_offset;

        let chambers_list: Vec<Chamber> = (0..chambers)
            .map(|index| {
                let boundary = if index < upper {
                    let arcs = levels[index];
                    let mut boundary = vec![
                        BoundarySegment {
                            arc: arcs.first,
                            forward: true,
                        },
                        BoundarySegment {
                            arc: arcs.middle,
                            forward: true,
                        },
                        BoundarySegment {
                            arc: arcs.last,
                            forward: true,
                        },
                    ];
                    if index > 0 {
                        boundary.push(BoundarySegment {
                            arc: levels[index - 1].middle,
                            forward: false,
                        });
                    }
                    boundary
                } else {
                    vec![
                        BoundarySegment {
                            arc: bottom.left,
                            forward: true,
                        },
                        BoundarySegment {
                            arc: bottom.right,
                            forward: true,
                        },
                        BoundarySegment {
                            arc: levels[upper - 1].middle,
                            forward: false,
                        },
                    ]
                };
                Chamber {
                    name: chamber_name(index, chambers),
                    boundary,
                    open: index == 0,
                    pressure: cursor.take(),
                }
            })
            .collect();

        let end = |arc: usize, end: ArcEnd| ArcEndRef { arc, end };
        let mut vertices = vec![
            Vertex {
                label: vertex_label(0),
                kind: VertexKind::Anchor(Anchor::A),
                ends: vec![end(levels[0].first, ArcEnd::Start)],
            },
            Vertex {
                label: vertex_label(1),
                kind: VertexKind::Anchor(Anchor::B),
                ends: vec![end(levels[0].last, ArcEnd::End)],
            },
        ];
        for (level, arcs) in levels.iter().enumerate() {
            let (below_first, below_last) = match levels.get(level + 1) {
                Some(next) => (next.first, next.last),
                None => (bottom.left, bottom.right),
            };
            vertices.push(Vertex {
                label: right_label(level),
                kind: VertexKind::Joint,
                ends: vec![
                    end(arcs.middle, ArcEnd::End),
                    end(arcs.last, ArcEnd::Start),
                    end(below_last, ArcEnd::End),
                ],
            });
            vertices.push(Vertex {
                label: left_label(level),
                kind: VertexKind::Joint,
                ends: vec![
                    end(arcs.first, ArcEnd::End),
                    end(arcs.middle, ArcEnd::Start),
                    end(below_first, ArcEnd::Start),
                ],
            });
        }
        vertices.push(Vertex {
            label: pole_label,
            kind: VertexKind::Pole,
            ends: vec![end(bottom.left, ArcEnd::End), end(bottom.right, ArcEnd::Start)],
        });

        let mut length_groups: Vec<Vec<usize>> = levels
            .iter()
            .flat_map(|l| [l.first, l.last, l.middle])
            .map(|arc| vec![arc])
            .collect();
        length_groups.push(vec![bottom.left, bottom.right]);

        Ok(Self {
            arcs,
            vertices,
            chambers: chambers_list,
            levels,
            bottom,
            length_groups,
            bottom_offset,
            dimension: cursor.next,
        })
    }

    pub fn chamber_count(&self) -> usize {
        self.chambers.len()
    }

    pub fn arc_index(&self, name: &str) -> Option<usize> {
        self.arcs.iter().position(|arc| arc.name == name)
    }

    pub fn vertex(&self, label: &str) -> Option<&Vertex> {
        self.vertices.iter().find(|vertex| vertex.label == label)
    }

    /// Number of scalar equations the graph generates; always equals `dimension`.
    pub fn equation_count(&self) -> usize {
        let continuity: usize = self
            .vertices
            .iter()
            .map(|vertex| match vertex.kind {
                VertexKind::Anchor(_) => 2,
                VertexKind::Joint => 2 * (vertex.ends.len() - 1) + 2,
                VertexKind::Pole => 2,
            })
            .sum();
        self.length_groups.len() + continuity + self.chambers.len()
    }
}
